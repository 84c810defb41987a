fn main() {
    magmapper::cli::run();
}
