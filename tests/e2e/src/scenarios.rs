//! Actor bodies shared by the end-to-end scenarios

use crate::topology::TIMER;
use courier_actors::{schedule_address, Actor, Address, Context};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Payload carried through e2e topologies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Wire {
    Ping(u32),
    Text(String),
    /// Passed around a ring; every node appends its own address to `trail`
    Token { hops: u32, trail: Vec<String> },
}

/// Replies to every message with the same payload
pub async fn echo(ctx: Context<Wire>) -> anyhow::Result<()> {
    while let Some(msg) = ctx.recv().await {
        let (source, _, payload) = msg.into_parts();
        ctx.out(source, payload);
    }
    Ok(())
}

/// Ring member: forwards tokens to `next` through the timer gateway, or to
/// `report` once the token has no hops left
pub fn ring_node(next: Address, report: Address, delay: Duration) -> impl Actor<Wire> {
    move |ctx: Context<Wire>| async move {
        while let Some(msg) = ctx.recv().await {
            let Wire::Token { hops, mut trail } = msg.into_payload() else {
                anyhow::bail!("ring node {} expects tokens only", ctx.address());
            };
            trail.push(ctx.address().to_string());
            debug!(node = %ctx.address(), hops, "Token received");

            if hops == 0 {
                ctx.out(report.clone(), Wire::Token { hops, trail });
            } else {
                let wake = schedule_address(TIMER, delay, &next);
                ctx.out(wake, Wire::Token { hops: hops - 1, trail });
            }
        }
        anyhow::Ok(())
    }
}
