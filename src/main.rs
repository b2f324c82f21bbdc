use songbook::cli::run;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    run()
}
