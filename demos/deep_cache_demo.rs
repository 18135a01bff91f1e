use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    sentiment_cache::example_apps::run_deep_cache_demo(std::env::args().skip(1))
}
