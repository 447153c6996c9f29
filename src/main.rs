use anyhow::Context;
use clap::Parser;
use invocation_grid::api;
use invocation_grid::config::ServiceConfig;
use invocation_grid::executor::registry::TaskRegistry;
use invocation_grid::invocation::service::InvocationService;
use invocation_grid::invocation::task::{Invocable, ServiceContext, TaskFuture};
use invocation_grid::membership::service::MembershipService;
use invocation_grid::membership::types::{Member, MemberId};
use invocation_grid::transport::udp::UdpTransport;
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "invocation-node", about = "Runs one member of an invocation cluster")]
struct Args {
    /// UDP address for member-to-member traffic
    #[arg(long)]
    bind: SocketAddr,

    /// HTTP address for the control surface (defaults to the bind port + 1000)
    #[arg(long)]
    http: Option<SocketAddr>,

    /// Member id (random when omitted)
    #[arg(long)]
    id: Option<String>,

    /// Peer member as <id>@<addr>; repeatable
    #[arg(long = "peer", value_parser = parse_peer)]
    peers: Vec<Member>,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    request_timeout_ms: Option<u64>,

    /// JSON file with a ServiceConfig
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

fn parse_peer(raw: &str) -> Result<Member, String> {
    let (id, addr) = raw
        .split_once('@')
        .ok_or_else(|| format!("expected <id>@<addr>, got '{}'", raw))?;
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| format!("invalid peer address '{}': {}", addr, e))?;
    Ok(Member::new(MemberId::from(id), Some(addr)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    // 1. Configuration:
    let mut config = match &args.config {
        Some(path) => ServiceConfig::from_file(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.worker_count = workers;
    }
    if let Some(timeout) = args.request_timeout_ms {
        config.request_timeout_ms = timeout;
    }

    // 2. Membership:
    let local_id = args.id.map(|id| MemberId::from(id.as_str())).unwrap_or_default();
    let membership = MembershipService::new(Member::new(local_id, Some(args.bind)));
    for peer in args.peers {
        membership.join(peer);
    }
    tracing::info!("Node ID: {}", membership.local_id());

    // 3. Transport + task handlers:
    let (transport, inbox) = UdpTransport::bind(args.bind, membership.clone())
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    let registry = demo_registry();

    // 4. Invocation service:
    let service = InvocationService::new(config, membership.clone(), transport, registry);
    service.start(inbox);

    // 5. Spawn stats reporter:
    let stats_service = service.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;
            let stats = stats_service.stats();
            tracing::info!(
                "Invocation stats: {} member(s), {} open poll(s), {} request(s) received, {} response(s) sent",
                stats_service.membership().len(),
                stats.open_polls,
                stats.requests_received,
                stats.responses_sent
            );
        }
    });

    // 6. Start HTTP server:
    let http_addr = args
        .http
        .unwrap_or_else(|| SocketAddr::new(args.bind.ip(), args.bind.port() + 1000));

    tracing::info!("HTTP server listening on {}", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    axum::serve(listener, api::router(service)).await?;

    Ok(())
}

fn demo_registry() -> Arc<TaskRegistry> {
    let registry = TaskRegistry::new();

    registry.register("echo", |payload| async move { Ok(payload) });

    registry.register("sleep", |payload| async move {
        let ms = payload["ms"].as_u64().unwrap_or(1000);
        tracing::info!("Sleeping for {} ms", ms);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!({ "slept_ms": ms }))
    });

    registry.register("fail", |payload| async move {
        let reason = payload.as_str().unwrap_or("requested failure").to_string();
        Err(anyhow::anyhow!(reason))
    });

    registry.register_factory("member", |_payload| Ok(Box::new(WhoAmI::default()) as Box<dyn Invocable>));

    registry
}

/// Reports the member it runs on, taken from the service context at init.
#[derive(Default)]
struct WhoAmI {
    member: Option<MemberId>,
    service: String,
}

impl Invocable for WhoAmI {
    fn init(&mut self, ctx: &ServiceContext) -> anyhow::Result<()> {
        self.member = Some(ctx.local_member.clone());
        self.service = ctx.service_name.clone();
        Ok(())
    }

    fn run(&mut self) -> TaskFuture {
        let member = self.member.clone();
        let service = self.service.clone();
        Box::pin(async move {
            Ok(json!({
                "member": member.map(|m| m.to_string()).unwrap_or_default(),
                "service": service,
            }))
        })
    }
}
