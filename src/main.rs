use std::process::ExitCode;

fn main() -> ExitCode {
    s3_weburl_lib::run()
}
