fn main() {
    if let Err(err) = autocast::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
