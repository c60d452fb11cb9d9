fn main() {
    use object_dump::cli::parse;
    let cli = parse();
    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", level)).init();
    let code = object_dump::app::run_cli(cli);
    if code != 0 {
        std::process::exit(code);
    }
}
