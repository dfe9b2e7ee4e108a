//! Friendlink 演示入口
//!
//! 初始化日志与配置，用内存后端跑一遍邀请认领与链接请求两条流程，最后输出对账后的好友列表（JSON）。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use friendlink::config::{load_config, AppConfig};
use friendlink::core::LinkSupervisor;
use friendlink::model::AuthContext;
use friendlink::remote::InMemoryLinkBackend;
use friendlink::{observability, spawn_reconciliation_timer, LinkCoordinatorBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config ({}), using defaults", e);
        AppConfig::default()
    });

    let backend = Arc::new(InMemoryLinkBackend::new());
    let supervisor = LinkSupervisor::new();
    let build = |auth: AuthContext| {
        LinkCoordinatorBuilder::new(auth, backend.clone())
            .with_config(config.clone())
            .with_supervisor(supervisor.clone())
            .try_build()
            .context("Invalid link configuration")
    };

    let alex = Arc::new(build(AuthContext::new("alex", "alex@example.com", "Alex"))?);
    let sam = build(AuthContext::new("sam", "sam@example.com", "Sam"))?;
    let jo = build(AuthContext::new("jo", "Jo@Example.com", "Jo"))?;

    let timer = spawn_reconciliation_timer(alex.clone(), supervisor.child_token());
    let flow = alex.flow_token();

    // 邀请令牌流程
    let sam_placeholder = alex.add_placeholder("Sam", &flow).await;
    let token = alex
        .create_invite(sam_placeholder.member_id, &flow)
        .await
        .context("Failed to create invite")?;
    let outcome = sam
        .claim_invite(token.id, &sam.flow_token())
        .await
        .context("Failed to claim invite")?;
    tracing::info!("Invite claimed: {:?}", outcome);

    // 链接请求流程
    let jo_placeholder = alex.add_placeholder("Jo", &flow).await;
    let request = alex
        .create_link_request("jo@example.com", jo_placeholder.member_id, &flow)
        .await
        .context("Failed to send link request")?;
    let incoming = jo
        .incoming_requests(&jo.flow_token())
        .await
        .context("Failed to list incoming requests")?;
    tracing::info!("Jo has {} incoming request(s)", incoming.len());
    let outcome = jo
        .accept_link_request(request.id, &jo.flow_token())
        .await
        .context("Failed to accept link request")?;
    tracing::info!("Link request accepted: {:?}", outcome);

    alex.reconciliation()
        .invalidate()
        .await
        .context("Reconciliation actor unavailable")?;
    let friends = alex.refresh(&flow).await.context("Failed to refresh friends")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&friends).context("Failed to serialize friends")?
    );

    let pending = alex.pending_failures().await?;
    if !pending.is_empty() {
        tracing::warn!("{} link(s) still need attention", pending.len());
    }

    supervisor.shutdown();
    timer.await.context("Reconciliation timer panicked")?;
    Ok(())
}
