use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    annotation_prep::apps::run_cli(std::env::args().skip(1))
}
