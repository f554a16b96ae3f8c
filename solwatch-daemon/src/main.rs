use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    solwatch_daemon::run().await?;
    Ok(())
}
