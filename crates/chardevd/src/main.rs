mod infra;
mod runtime;

fn main() {
    if let Err(err) = runtime::run_from_args() {
        eprintln!("chardevd: {err}");
        std::process::exit(1);
    }
}
