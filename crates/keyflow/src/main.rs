fn main() {
    keyflow_cli::run_main();
}
