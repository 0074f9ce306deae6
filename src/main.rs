fn main() {
    cad_dataprep::cli::run();
}
