use std::{env, path::PathBuf};

use selq::plan::ConfigureOpts;
use selq::{DomainRegistry, QueryPlan};

fn usage() {
    eprintln!("Usage: print_sql <domains_dir> <domain_name> [field ...]");
    eprintln!("Example: cargo run --example print_sql -- examples/domains events name email");
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = env::args().skip(1).collect::<Vec<_>>();
    if args.len() < 2 {
        usage();
        std::process::exit(1);
    }

    let domains_dir = PathBuf::from(args.remove(0));
    let domain_name = args.remove(0);

    let registry = DomainRegistry::load_from_dir(domains_dir)?;
    let domain = registry
        .get(&domain_name)
        .ok_or_else(|| anyhow::anyhow!("unknown domain {domain_name}"))?
        .clone();

    let mut plan = QueryPlan::configure(domain, None, ConfigureOpts::default())?;
    if !args.is_empty() {
        plan = plan.select(args.iter().map(String::as_str));
    }

    let (sql, params) = plan.to_sql()?;
    println!("{sql}");
    println!("-- params: {}", serde_json::to_string(&params)?);
    Ok(())
}
