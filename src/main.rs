fn main() -> std::process::ExitCode {
    solo_lib::run()
}
