//! swarm-snapshot binary.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    vertex_sim_commands::run().await
}
