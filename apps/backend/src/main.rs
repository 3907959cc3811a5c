#[tokio::main]
async fn main() -> anyhow::Result<()> {
    brainflash_backend::run().await
}
