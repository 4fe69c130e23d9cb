fn main() {
    if let Err(err) = csv_conform::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
