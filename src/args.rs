use anyhow::{bail, Result};
use clap::Parser;
use tracing::error;

#[derive(Debug, Parser, Clone)]
pub struct Args {
    /// Resource group the registry lives in
    #[clap(long, env = "RES_GROUP", default_value = "")]
    pub resource_group: String,
    /// Name of the Azure Container Registry
    #[clap(long = "name", env = "ACR_NAME", default_value = "")]
    pub registry: String,
    /// Comma separated list of repositories to clean
    #[clap(long, env = "REPO_NAMES", default_value = "")]
    pub repositories: String,
    /// Azure CLI executable (`az.cmd` is used for a bare `az` on Windows)
    #[clap(long, env = "AZ_PATH", default_value = "az")]
    pub az: String,
    #[clap(long)]
    pub debug: bool,
    #[clap(long)]
    pub trace: bool,
    #[clap(long)]
    pub dry_run: bool,
}

impl Args {
    pub fn new() -> Self {
        Self::parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub resource_group: String,
    pub registry: String,
    pub repositories: Vec<String>,
}

impl Config {
    pub fn new(resource_group: &str, registry: &str, repositories: &str) -> Result<Self> {
        let repositories = split_repositories(repositories);

        let mut valid = true;
        if registry.is_empty() {
            error!("Azure Container Registry name is required.");
            valid = false;
        }
        if repositories.is_empty() {
            error!("At least one repository has to be specified.");
            valid = false;
        }
        if !valid {
            bail!("The input parameters are invalid.");
        }

        Ok(Self {
            resource_group: resource_group.to_string(),
            registry: registry.to_string(),
            repositories,
        })
    }

    pub fn from_args(args: &Args) -> Result<Self> {
        Self::new(&args.resource_group, &args.registry, &args.repositories)
    }
}

fn split_repositories(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    raw.split(',').map(str::to_string).collect()
}
