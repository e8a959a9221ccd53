use anyhow::Result;

use crate::context::PodContext;

/// Round-trip to the identity and token stores
pub async fn health_check(ctx: &PodContext) -> Result<()> {
    ctx.registry.ping().await?;
    ctx.tokens.ping().await?;
    Ok(())
}
