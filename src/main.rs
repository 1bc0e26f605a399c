fn main() {
    if let Err(err) = studytrack_lib::run() {
        eprintln!("studytrack: {err:?}");
        std::process::exit(1);
    }
}
