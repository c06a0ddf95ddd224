// rforth main program

mod config;

use config::Config;

fn main() {
    let mut config = Config::new();
    config.process_args();

    if config.run {
        config.run_forth();
    }
}
