fn main() -> eyre::Result<()> {
    cloudthumb::main()
}
