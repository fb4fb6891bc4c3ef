use anyhow::Result;

fn main() -> Result<()> {
    varload::cli::execute()
}
