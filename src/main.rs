use std::process::ExitCode;

fn main() -> ExitCode {
    match tapdiff::cli::run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{:?}", report);
            ExitCode::from(2)
        }
    }
}
