use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::io::Read;
use std::time::Duration;

mod render;

// `#[zbus::proxy]` generates `KioskProxy` (async) and `KioskProxyBlocking`.
#[zbus::proxy(
    interface = "org.staffroom.Kiosk1",
    default_service = "org.staffroom.Kiosk1",
    default_path = "/org/staffroom/Kiosk1"
)]
trait Kiosk {
    async fn scan(&self, descriptor: &[f64]) -> zbus::Result<String>;
    async fn match_descriptor(&self, descriptor: &[f64]) -> zbus::Result<String>;
    async fn choose_destination(&self, id: i64, destination: &str) -> zbus::Result<String>;
    async fn cancel_prompt(&self, id: i64) -> zbus::Result<bool>;
    async fn enroll(
        &self,
        name: &str,
        seat_code: &str,
        department: &str,
        descriptor: &[f64],
    ) -> zbus::Result<String>;
    async fn mark_in(&self, id: i64) -> zbus::Result<String>;
    async fn mark_out(&self, id: i64, destination: &str) -> zbus::Result<String>;
    async fn mark_in_class(&self, id: i64, classroom: &str) -> zbus::Result<String>;
    async fn update(&self, id: i64, patch: &str) -> zbus::Result<String>;
    async fn remove(&self, id: i64) -> zbus::Result<bool>;
    async fn list(&self) -> zbus::Result<String>;
    async fn board(&self) -> zbus::Result<String>;
    async fn places(&self) -> zbus::Result<Vec<String>>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "staffroom", about = "Staffroom kiosk CLI")]
struct Cli {
    /// Talk to the daemon on the system bus (default: session bus, or STAFFROOM_BUS)
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a captured descriptor and apply the resulting transition
    Scan {
        /// JSON file holding the descriptor, or `-` for stdin
        descriptor: String,
        /// Answer the destination prompt right away if one opens
        #[arg(short, long)]
        destination: Option<String>,
    },
    /// Resolve a descriptor without changing any state
    Match {
        /// JSON file holding the descriptor, or `-` for stdin
        descriptor: String,
    },
    /// Answer an open destination prompt
    Choose {
        id: i64,
        /// Destination (default: the first configured place)
        destination: Option<String>,
    },
    /// Cancel an open destination prompt; the person stays in the room
    Cancel { id: i64 },
    /// Enroll a new identity
    Enroll {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        seat: String,
        #[arg(short, long)]
        department: Option<String>,
        /// JSON file holding the descriptor, or `-` for stdin
        descriptor: String,
    },
    /// Mark someone as in the staff room
    In { id: i64 },
    /// Mark someone as out, with a destination
    Out { id: i64, destination: String },
    /// Mark someone as teaching in a classroom
    Class { id: i64, classroom: String },
    /// Edit name, seat code or department
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        seat: Option<String>,
        /// Empty string clears the department
        #[arg(long)]
        department: Option<String>,
    },
    /// Delete an identity
    Remove { id: i64 },
    /// List every identity
    List,
    /// Show the roster board
    Board {
        /// Redraw every N seconds until interrupted
        #[arg(short, long, value_name = "SECS")]
        watch: Option<u64>,
    },
    /// List the configured destinations
    Places,
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let system = cli.system || bus_from_env(std::env::var("STAFFROOM_BUS").ok().as_deref())?;
    let conn = if system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("connecting to D-Bus")?;
    let proxy = KioskProxy::new(&conn)
        .await
        .context("staffroomd is not reachable")?;

    match cli.command {
        Commands::Scan {
            descriptor,
            destination,
        } => {
            let values = read_descriptor(&descriptor)?;
            tracing::debug!(dimension = values.len(), "submitting scan");
            let outcome: Value = serde_json::from_str(&proxy.scan(&values).await?)?;
            print_json(&outcome)?;
            if outcome["outcome"] == "destination_required" {
                let id = outcome["identity"]["id"]
                    .as_i64()
                    .context("prompt without identity id")?;
                match destination {
                    Some(destination) => {
                        print_reply(&proxy.choose_destination(id, &destination).await?)?;
                    }
                    None => eprintln!(
                        "destination required: staffroom choose {id} <place> \
                         (or staffroom cancel {id})"
                    ),
                }
            }
        }
        Commands::Match { descriptor } => {
            let values = read_descriptor(&descriptor)?;
            print_reply(&proxy.match_descriptor(&values).await?)?;
        }
        Commands::Choose { id, destination } => {
            let destination = destination.unwrap_or_default();
            print_reply(&proxy.choose_destination(id, &destination).await?)?;
        }
        Commands::Cancel { id } => {
            if proxy.cancel_prompt(id).await? {
                println!("Prompt for {id} cancelled");
            } else {
                println!("No open prompt for {id}");
            }
        }
        Commands::Enroll {
            name,
            seat,
            department,
            descriptor,
        } => {
            let values = read_descriptor(&descriptor)?;
            if values.is_empty() {
                bail!("cannot enroll without a descriptor");
            }
            let department = department.unwrap_or_default();
            print_reply(&proxy.enroll(&name, &seat, &department, &values).await?)?;
        }
        Commands::In { id } => print_reply(&proxy.mark_in(id).await?)?,
        Commands::Out { id, destination } => {
            print_reply(&proxy.mark_out(id, &destination).await?)?
        }
        Commands::Class { id, classroom } => {
            print_reply(&proxy.mark_in_class(id, &classroom).await?)?
        }
        Commands::Update {
            id,
            name,
            seat,
            department,
        } => {
            let patch = patch_json(name, seat, department);
            if patch.as_object().is_some_and(|p| p.is_empty()) {
                bail!("nothing to update (use --name, --seat or --department)");
            }
            print_reply(&proxy.update(id, &patch.to_string()).await?)?;
        }
        Commands::Remove { id } => {
            proxy.remove(id).await?;
            println!("Removed identity {id}");
        }
        Commands::List => print_reply(&proxy.list().await?)?,
        Commands::Board { watch } => match watch {
            None => {
                let board: Value = serde_json::from_str(&proxy.board().await?)?;
                print!("{}", render::board(&board));
            }
            Some(secs) => {
                let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let board: Value = serde_json::from_str(&proxy.board().await?)?;
                            // Clear screen, cursor home.
                            print!("\x1b[2J\x1b[H{}", render::board(&board));
                        }
                        _ = tokio::signal::ctrl_c() => break,
                    }
                }
            }
        },
        Commands::Places => {
            for place in proxy.places().await? {
                println!("{place}");
            }
        }
        Commands::Status => print_reply(&proxy.status().await?)?,
    }

    Ok(())
}

fn bus_from_env(value: Option<&str>) -> Result<bool> {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("session") => Ok(false),
        Some("system") => Ok(true),
        Some(other) => bail!("STAFFROOM_BUS must be session or system, got {other:?}"),
    }
}

fn read_descriptor(source: &str) -> Result<Vec<f64>> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading descriptor from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("reading {source}"))?
    };
    parse_descriptor(&raw)
}

/// Accepts a bare JSON array, or any object with a `descriptor` array such
/// as the `enrollment_required` output of `scan`.
fn parse_descriptor(raw: &str) -> Result<Vec<f64>> {
    let value: Value = serde_json::from_str(raw).context("descriptor is not valid JSON")?;
    let values = match &value {
        Value::Array(_) => &value,
        Value::Object(map) => map
            .get("descriptor")
            .context("object has no \"descriptor\" field")?,
        _ => bail!("descriptor must be a JSON array of numbers"),
    };
    Ok(serde_json::from_value(values.clone())
        .context("descriptor must be a JSON array of numbers")?)
}

fn patch_json(name: Option<String>, seat: Option<String>, department: Option<String>) -> Value {
    let mut patch = serde_json::Map::new();
    if let Some(name) = name {
        patch.insert("name".into(), name.into());
    }
    if let Some(seat) = seat {
        patch.insert("seatCode".into(), seat.into());
    }
    if let Some(department) = department {
        patch.insert("department".into(), department.into());
    }
    Value::Object(patch)
}

fn print_reply(reply: &str) -> Result<()> {
    let value: Value = serde_json::from_str(reply).context("daemon returned invalid JSON")?;
    print_json(&value)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
