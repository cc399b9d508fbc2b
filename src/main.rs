fn main() -> anyhow::Result<()> {
    trail_cutout::cli_main::main()
}
