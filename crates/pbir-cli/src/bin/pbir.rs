fn main() -> anyhow::Result<()> {
    pbir_cli::cli::run()
}
