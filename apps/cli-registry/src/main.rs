use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tnb_core::{ConversationReference, NotificationTargetType, PagedData, reference_key};
use tnb_store::{
    ConversationReferenceStore, DefaultConversationReferenceStore, LocalFileStorage,
    ReferenceStorage, RegistryEntry, SharedReferenceStorage, store_path_from,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Teams notification bot registry CLI")]
struct Cli {
    /// Registry location. Defaults to the bot's own location, resolved from
    /// NOTIFICATION_STORE_DIR, NOTIFICATION_STORE_FILENAME and RUNNING_ON_AZURE/TEMP.
    #[arg(long, global = true)]
    path: Option<PathBuf>,
    #[arg(long, global = true, value_enum, default_value_t = Backend::File)]
    backend: Backend,
    /// Emit JSON output
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    File,
    #[cfg(feature = "store_sqlite")]
    Sqlite,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List registered installations
    List {
        #[arg(long)]
        page_size: Option<usize>,
        #[arg(long)]
        token: Option<String>,
    },
    /// Show the stored reference under a registry key
    Show {
        #[arg()]
        key: String,
    },
    /// Remove the installation of a tenant conversation
    Remove {
        #[arg()]
        tenant: String,
        #[arg()]
        conversation: String,
    },
}

#[derive(Serialize)]
struct ListEntry {
    key: String,
    tenant: String,
    conversation: String,
    target: String,
    service_url: String,
}

#[derive(Serialize)]
struct ListResult {
    entries: Vec<ListEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    continuation_token: Option<String>,
}

impl Cli {
    fn registry_path(&self, lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
        self.path.clone().unwrap_or_else(|| store_path_from(lookup))
    }
}

fn open_storage(backend: Backend, path: PathBuf) -> Result<SharedReferenceStorage> {
    match backend {
        Backend::File => Ok(Arc::new(LocalFileStorage::new(path))),
        #[cfg(feature = "store_sqlite")]
        Backend::Sqlite => tnb_store::sqlite_storage(&path)
            .with_context(|| format!("opening sqlite registry {}", path.display())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tnb_telemetry::install("tnb-registry")?;
    let cli = Cli::parse();
    let path = cli.registry_path(|name| std::env::var(name).ok());
    let storage = open_storage(cli.backend, path.clone())?;
    let store = DefaultConversationReferenceStore::new(storage.clone());

    match cli.command {
        Commands::List { page_size, token } => {
            let listed = list_rows(&storage, page_size, token.as_deref())
                .await
                .with_context(|| format!("listing {}", path.display()))?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&listed)?);
            } else if listed.entries.is_empty() {
                println!("No installations in {}", path.display());
            } else {
                print_table(&listed.entries);
                if let Some(token) = listed.continuation_token {
                    println!("next page: --token {token}");
                }
            }
        }
        Commands::Show { key } => {
            let Some(reference) = storage.read(&key).await? else {
                bail!("no installation under key {key}");
            };
            println!("{}", serde_json::to_string_pretty(&reference)?);
        }
        Commands::Remove {
            tenant,
            conversation,
        } => {
            let key = registry_key(&tenant, &conversation);
            let reference = storage.read(&key).await?.unwrap_or_default();
            let removed = store.remove(&key, &reference).await?;
            if removed {
                info!(key = %key, "installation removed");
            }
            if cli.json {
                println!("{}", serde_json::json!({ "key": key, "removed": removed }));
            } else if removed {
                println!("Removed {key}");
            } else {
                println!("No installation under {key}");
            }
        }
    }

    Ok(())
}

fn registry_key(tenant: &str, conversation: &str) -> String {
    let mut reference = ConversationReference::default();
    reference.conversation.tenant_id = Some(tenant.to_string());
    reference.conversation.id = conversation.to_string();
    reference_key(&reference)
}

async fn list_rows(
    storage: &SharedReferenceStorage,
    page_size: Option<usize>,
    token: Option<&str>,
) -> Result<ListResult> {
    let PagedData {
        data,
        continuation_token,
    } = storage.list_entries(page_size, token).await?;
    Ok(ListResult {
        entries: data.iter().map(list_entry).collect(),
        continuation_token,
    })
}

fn list_entry(entry: &RegistryEntry) -> ListEntry {
    let reference = &entry.reference;
    ListEntry {
        key: entry.key.clone(),
        tenant: reference.tenant_id().unwrap_or_default().to_string(),
        conversation: reference.conversation.id.clone(),
        target: NotificationTargetType::of(reference)
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".into()),
        service_url: reference.service_url.clone().unwrap_or_default(),
    }
}

fn print_table(entries: &[ListEntry]) {
    println!(
        "{:<40} {:<8} {:<24} {:<}",
        "KEY", "TARGET", "TENANT", "SERVICE URL"
    );
    for entry in entries {
        println!(
            "{:<40} {:<8} {:<24} {}",
            entry.key, entry.target, entry.tenant, entry.service_url
        );
    }
}
