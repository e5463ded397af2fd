#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lifelog_lib::run().await
}
