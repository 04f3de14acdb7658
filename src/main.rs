fn main() {
    if let Err(err) = access_ingest::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
