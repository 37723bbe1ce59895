fn main() {
    if let Err(e) = serbridge_lib::run() {
        eprintln!("serbridge: {:#}", e);
        std::process::exit(1);
    }
}
