use std::process::ExitCode;

fn main() -> ExitCode {
    tern::lib_main()
}
