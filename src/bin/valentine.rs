//! Command-line client: publish a page, preview it, pay to unlock it.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use valentine_pages::{
    client::{
        api::ApiClient,
        gate::{GateState, PREVIEW_LIMIT, PreviewGate},
        payment::{
            Checkout, CheckoutResult, PaymentCompletion, PaymentFlowError, PaymentOutcome,
            unlock,
        },
        publish::{ValentineForm, publish},
        session::FileSessionStore,
        uploader::{PhotoFile, UploadCoordinator},
    },
    models::payment::PaymentOrder,
    services::payment_service::payment_signature,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Create and unlock valentine pages")]
struct Cli {
    /// API server origin
    #[arg(long, env = "VALENTINE_SERVER", default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Origin of the public site (defaults to the server)
    #[arg(long, env = "VALENTINE_SITE_URL")]
    site_url: Option<String>,

    /// Where the local session is kept
    #[arg(long, env = "VALENTINE_SESSION_FILE", default_value = ".valentine-session.json")]
    session_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload photos and publish a new page
    Create {
        /// Who the page is for
        #[arg(long = "to")]
        recipient_name: String,

        #[arg(long)]
        message: String,

        #[arg(long)]
        music_url: Option<String>,

        /// Uploads in flight at once
        #[arg(long, default_value_t = 1)]
        concurrency: usize,

        /// Image files, at least six
        #[arg(required = true, num_args = 1..)]
        photos: Vec<PathBuf>,
    },
    /// Show the current page and how many previews remain
    Status,
    /// Use one preview and print the link
    Preview,
    /// Pay to unlock the page
    Pay {
        /// Payment id from a completed checkout
        #[arg(long, requires = "signature")]
        payment_id: Option<String>,

        /// Signature from a completed checkout
        #[arg(long, requires = "payment_id")]
        signature: Option<String>,

        /// Sign the completion locally (servers without gateway keys only)
        #[arg(long, env = "VALENTINE_DEV_SECRET", conflicts_with = "payment_id")]
        dev_secret: Option<String>,
    },
    /// Forget the page and the preview counter
    Reset,
}

/// Uses a completion supplied on the command line.
struct GivenCompletion(PaymentCompletion);

#[async_trait]
impl Checkout for GivenCompletion {
    async fn collect(&self, _: &PaymentOrder) -> CheckoutResult {
        Ok(Some(self.0.clone()))
    }
}

/// Signs a made-up payment with the development secret.
struct DevCheckout(String);

#[async_trait]
impl Checkout for DevCheckout {
    async fn collect(&self, order: &PaymentOrder) -> CheckoutResult {
        let payment_id = format!("pay_{}", Uuid::new_v4().simple());
        let signature = payment_signature(&self.0, &order.id, &payment_id)
            .map_err(|e| PaymentFlowError::Checkout(e.to_string()))?;
        Ok(Some(PaymentCompletion {
            payment_id,
            signature,
        }))
    }
}

/// Asks for the completion on the terminal. An empty answer dismisses.
struct PromptCheckout;

#[async_trait]
impl Checkout for PromptCheckout {
    async fn collect(&self, order: &PaymentOrder) -> CheckoutResult {
        let mut out = tokio::io::stdout();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let banner = format!(
            "Order {} for {} {} (minor units). Complete the checkout, then paste the result.\n",
            order.id, order.amount, order.currency
        );
        let io_err = |e: std::io::Error| PaymentFlowError::Checkout(e.to_string());

        out.write_all(banner.as_bytes()).await.map_err(io_err)?;
        out.write_all(b"payment id: ").await.map_err(io_err)?;
        out.flush().await.map_err(io_err)?;
        let payment_id = lines.next_line().await.map_err(io_err)?.unwrap_or_default();
        if payment_id.trim().is_empty() {
            return Ok(None);
        }
        out.write_all(b"signature: ").await.map_err(io_err)?;
        out.flush().await.map_err(io_err)?;
        let signature = lines.next_line().await.map_err(io_err)?.unwrap_or_default();
        if signature.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(PaymentCompletion {
            payment_id: payment_id.trim().to_string(),
            signature: signature.trim().to_string(),
        }))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let api = ApiClient::new(&cli.server);
    let site_url = cli.site_url.clone().unwrap_or_else(|| cli.server.clone());
    let store = FileSessionStore::new(&cli.session_file);
    let mut gate = PreviewGate::open(store, site_url)
        .await
        .with_context(|| format!("loading session from {}", cli.session_file.display()))?;

    if let Err(e) = gate.refresh(&api).await {
        tracing::warn!("could not refresh payment status: {}", e);
    }

    match cli.command {
        Command::Create {
            recipient_name,
            message,
            music_url,
            concurrency,
            photos,
        } => {
            let mut files = Vec::with_capacity(photos.len());
            for path in &photos {
                let file = PhotoFile::from_path(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                files.push(file);
            }
            let coordinator = UploadCoordinator::new(api.clone()).with_concurrency(concurrency);
            let form = ValentineForm {
                recipient_name,
                message,
                photos: files,
                music_url,
            };
            let id = publish(form, &coordinator, &api, &mut gate).await?;
            println!("created page {}", id);
            print_state(&gate);
        }
        Command::Status => print_state(&gate),
        Command::Preview => {
            let url = gate.preview().await?;
            println!("{}", url);
            print_state(&gate);
        }
        Command::Pay {
            payment_id,
            signature,
            dev_secret,
        } => {
            let outcome = match (payment_id, signature, dev_secret) {
                (Some(payment_id), Some(signature), _) => {
                    let checkout = GivenCompletion(PaymentCompletion {
                        payment_id,
                        signature,
                    });
                    unlock(&api, &checkout, &mut gate).await?
                }
                (_, _, Some(secret)) => unlock(&api, &DevCheckout(secret), &mut gate).await?,
                _ => unlock(&api, &PromptCheckout, &mut gate).await?,
            };
            match outcome {
                PaymentOutcome::Unlocked => println!("payment verified, page unlocked"),
                PaymentOutcome::AlreadyPaid => println!("page is already unlocked"),
                PaymentOutcome::Cancelled => println!("checkout dismissed"),
                PaymentOutcome::Rejected => bail!("payment could not be verified"),
            }
            print_state(&gate);
        }
        Command::Reset => {
            gate.reset().await?;
            println!("session cleared");
        }
    }

    Ok(())
}

fn print_state<S>(gate: &PreviewGate<S>)
where
    S: valentine_pages::client::session::SessionStore,
{
    match gate.state() {
        GateState::NoPage => println!("no page yet"),
        GateState::LockedUnpaidAvailable { remaining } => println!(
            "page {} locked: {} of {} previews left",
            display_id(gate.created_page_id()),
            remaining,
            PREVIEW_LIMIT
        ),
        GateState::LockedUnpaidExhausted => println!(
            "page {} locked: no previews left, run `pay` to unlock",
            display_id(gate.created_page_id())
        ),
        GateState::UnlockedPaid => {
            if let Some(url) = gate.share_url() {
                println!("page unlocked: {}", url);
            }
        }
    }
}

fn display_id(id: Option<Uuid>) -> String {
    id.map(|id| id.to_string()).unwrap_or_default()
}
