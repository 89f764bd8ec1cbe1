use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;
use sidetree_crypto::{Cid, Multihasher};
use sidetree_ledger::{InMemoryLedger, InMemoryOffLedgerStore};
use sidetree_node::{
    default_registry, ChannelConfig, ChannelDeps, NamespaceConfig, NodeConfig, ObserverSection,
    SidetreeNode,
};
use sidetree_observer::StaticMembership;
use sidetree_protocol::{load_protocol_file, DocumentType};
use sidetree_queue::{MemoryQueueProvider, OperationQueue, QueueProvider, SqliteQueueProvider};
use sidetree_store::{InMemoryCas, InMemoryOperationStoreProvider};
use sidetree_types::{AnchorString, Operation, OperationType, ANCHOR_PREFIX};
use sidetree_v1::{default_protocol, CreateRequest, Delta, VERSION};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Queue(args) => cmd_queue(args, format),
        Command::Protocol(args) => cmd_protocol(args, format),
        Command::Anchor(args) => cmd_anchor(args, format),
        Command::Config(args) => cmd_config(args, format),
        Command::Demo(args) => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(cmd_demo(args, format))
        }
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_queue(args: QueueArgs, format: OutputFormat) -> anyhow::Result<()> {
    let (location, count) = match &args.action {
        QueueAction::Len(location) => (location, None),
        QueueAction::Peek { location, count } => (location, Some(*count)),
    };
    let provider = SqliteQueueProvider::new(&location.dir);
    let queue = provider
        .create(&location.channel, &location.namespace)
        .with_context(|| {
            let dir = provider.queue_dir(&location.channel, &location.namespace);
            format!("opening queue in {}", dir.display())
        })?;

    let result = match count {
        None => {
            let len = queue.len();
            match format {
                OutputFormat::Json => print_json(&json!({ "len": len })),
                OutputFormat::Text => {
                    println!(
                        "{} queued in {}/{}",
                        len.to_string().bold(),
                        location.channel,
                        location.namespace.cyan()
                    );
                    Ok(())
                }
            }
        }
        Some(n) => {
            let ops = queue.peek(n)?;
            match format {
                OutputFormat::Json => {
                    let items: Vec<_> = ops
                        .iter()
                        .map(|q| {
                            json!({
                                "unique_suffix": q.operation.unique_suffix(),
                                "type": q.operation.op_type().as_str(),
                                "namespace": q.operation.namespace(),
                                "arrived_at": q.operation.arrived_at(),
                                "protocol_genesis_time": q.protocol_genesis_time,
                                "payload_bytes": q.operation.payload().len(),
                            })
                        })
                        .collect();
                    print_json(&json!(items))
                }
                OutputFormat::Text => {
                    if ops.is_empty() {
                        println!("Queue is empty.");
                    }
                    for (i, q) in ops.iter().enumerate() {
                        println!(
                            "{:>4}  {:<10} {}  genesis {}  {} bytes",
                            i,
                            q.operation.op_type().as_str().yellow(),
                            q.operation.unique_suffix(),
                            q.protocol_genesis_time,
                            q.operation.payload().len()
                        );
                    }
                    Ok(())
                }
            }
        }
    };
    queue.close()?;
    result
}

fn cmd_protocol(args: ProtocolArgs, format: OutputFormat) -> anyhow::Result<()> {
    match args.action {
        ProtocolAction::Validate { file } => {
            let params = load_protocol_file(&file)
                .with_context(|| format!("validating {}", file.display()))?;
            let registry = default_registry()?;
            let supported = registry.versions();
            match format {
                OutputFormat::Json => print_json(&serde_json::to_value(&params)?),
                OutputFormat::Text => {
                    println!("{} {} is valid", "✓".green().bold(), file.display());
                    for (version, p) in &params {
                        let known = supported
                            .iter()
                            .any(|s| sidetree_protocol::version_matches(s, version));
                        println!(
                            "  {}  genesis {}  max ops {}  compression {}  {}",
                            version.yellow().bold(),
                            p.genesis_time,
                            p.max_operation_count,
                            p.compression_algorithm,
                            if known { "supported".green() } else { "no factory".red() }
                        );
                    }
                    Ok(())
                }
            }
        }
        ProtocolAction::Default { genesis_time } => {
            let params = BTreeMap::from([(VERSION.to_string(), default_protocol(genesis_time))]);
            print_json(&serde_json::to_value(&params)?)
        }
    }
}

/// Accepts a bare anchor string or a full ledger key.
pub(crate) fn parse_anchor(
    input: &str,
    max_cas_uri_length: usize,
) -> anyhow::Result<(AnchorString, Cid)> {
    let bare = input.strip_prefix(ANCHOR_PREFIX).unwrap_or(input);
    let anchor = AnchorString::parse_with_limit(bare, max_cas_uri_length)?;
    let cid: Cid = anchor
        .core_index_uri
        .parse()
        .with_context(|| format!("core index URI {} is not a CID", anchor.core_index_uri))?;
    Ok((anchor, cid))
}

fn cmd_anchor(args: AnchorArgs, format: OutputFormat) -> anyhow::Result<()> {
    let AnchorAction::Parse {
        anchor,
        max_cas_uri_length,
    } = args.action;
    let (anchor, cid) = parse_anchor(&anchor, max_cas_uri_length)?;
    match format {
        OutputFormat::Json => print_json(&json!({
            "operation_count": anchor.operation_count,
            "core_index_uri": cid.as_str(),
            "ledger_key": anchor.ledger_key(),
        })),
        OutputFormat::Text => {
            println!("Operations: {}", anchor.operation_count.to_string().bold());
            println!("Core index: {}", cid.as_str().cyan());
            println!("Ledger key: {}", anchor.ledger_key());
            Ok(())
        }
    }
}

fn cmd_config(args: ConfigArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = NodeConfig::load(&args.file)?;
    if format == OutputFormat::Json {
        return print_json(&serde_json::to_value(&config)?);
    }
    let roles: Vec<_> = config.roles.iter().map(|r| r.as_str()).collect();
    println!("{} {} is valid", "✓".green().bold(), args.file.display());
    println!("  Peer: {} ({})", config.peer_id.bold(), config.msp_id);
    println!("  Roles: {}", roles.join(", ").cyan());
    println!("  Clustered: {}", config.clustered);
    println!("  Queue dir: {}", config.queue_dir.display());
    for channel in &config.channels {
        println!("  Channel {}", channel.name.yellow().bold());
        for ns in &channel.namespaces {
            let status = match load_protocol_file(&ns.protocol_file) {
                Ok(params) => format!("{} versions", params.len()).green(),
                Err(e) => e.to_string().red(),
            };
            println!("    {}  {}  {}", ns.namespace, ns.protocol_file.display(), status);
        }
    }
    Ok(())
}

fn demo_operation(namespace: &str, seed: u32) -> anyhow::Result<Operation> {
    let h = Multihasher::SHA2_256;
    let delta = Delta::new(
        h.commitment(&format!("demo-update-{seed}")),
        vec![json!({
            "action": "replace",
            "document": {"publicKeys": [], "services": [{"id": format!("svc{seed}")}]}
        })],
    );
    let request = CreateRequest::new(&h, h.commitment(&format!("demo-recovery-{seed}")), delta)?;
    let suffix = request.unique_suffix(&h)?;
    Ok(Operation::new(suffix, OperationType::Create, namespace, serde_json::to_vec(&request)?)?)
}

fn demo_config(dir: &Path, args: &DemoArgs) -> anyhow::Result<NodeConfig> {
    let protocol_file = dir.join("protocol.json");
    let params = BTreeMap::from([(VERSION.to_string(), default_protocol(0))]);
    std::fs::write(&protocol_file, serde_json::to_vec_pretty(&params)?)?;
    Ok(NodeConfig {
        peer_id: "demo-peer".into(),
        queue_dir: dir.join("queue"),
        observer: ObserverSection {
            period_ms: 200,
            ..ObserverSection::default()
        },
        channels: vec![ChannelConfig {
            name: args.channel.clone(),
            namespaces: vec![NamespaceConfig {
                namespace: args.namespace.clone(),
                protocol_file,
                document_type: DocumentType::DidDocument,
                batch_timeout_ms: 60_000,
                cache_size: 0,
            }],
        }],
        ..NodeConfig::default()
    })
}

/// Submit, anchor, observe and resolve `args.operations` creates on an
/// in-memory ledger. Returns the resolved documents.
pub(crate) async fn run_demo(args: &DemoArgs) -> anyhow::Result<Vec<serde_json::Value>> {
    let dir = tempfile::tempdir()?;
    let config = demo_config(dir.path(), args)?;
    let queues: Arc<dyn QueueProvider> = Arc::new(MemoryQueueProvider);
    let node = SidetreeNode::new(config.clone(), default_registry()?, queues)?;

    let ledger = Arc::new(InMemoryLedger::new(&args.channel)?);
    let op_stores = Arc::new(InMemoryOperationStoreProvider::new());
    let deps = ChannelDeps {
        ledger: ledger.clone(),
        publisher: ledger,
        cas: Arc::new(InMemoryCas::new()),
        off_ledger: Arc::new(InMemoryOffLedgerStore::new()),
        membership: Arc::new(StaticMembership::new(node.member())),
        op_stores: op_stores.clone(),
    };
    let channel = node.join_channel(&args.channel, deps).await?;

    let mut suffixes = Vec::new();
    for seed in 0..args.operations {
        let op = demo_operation(&args.namespace, seed)?;
        suffixes.push(op.unique_suffix().to_string());
        channel.add_operation(op).await?;
    }
    let anchored = channel.flush(true).await?;
    tracing::info!(anchored, "demo batch anchored");

    let store = op_stores.store(&args.namespace);
    let mut observed = false;
    for _ in 0..100 {
        channel.process_now().await?;
        if store.len() >= suffixes.len() {
            observed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    if !observed {
        node.stop().await?;
        bail!("observer stored {} of {} operations", store.len(), suffixes.len());
    }

    let mut documents = Vec::new();
    for suffix in &suffixes {
        match channel.resolve(&args.namespace, suffix).await? {
            Some(doc) => documents.push(doc),
            None => {
                node.stop().await?;
                bail!("document {suffix} did not resolve");
            }
        }
    }
    node.stop().await?;
    Ok(documents)
}

async fn cmd_demo(args: DemoArgs, format: OutputFormat) -> anyhow::Result<()> {
    let documents = run_demo(&args).await?;
    match format {
        OutputFormat::Json => print_json(&json!(documents)),
        OutputFormat::Text => {
            println!(
                "{} {} operations anchored on {} and resolved",
                "✓".green().bold(),
                documents.len(),
                args.channel.yellow()
            );
            for doc in &documents {
                let suffix = doc["unique_suffix"].as_str().unwrap_or("?");
                println!("  {}:{}", args.namespace, suffix.cyan());
            }
            Ok(())
        }
    }
}
