use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::net::{TcpListener, TcpStream};
use tracing::info;

use recshare::config::ProtocolConfig;
use recshare::dealer::{self, MaskSampling};
use recshare::field::Field;
use recshare::net::send_field;
use recshare::{party, query, setup, shares, verify, Role};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a compute party (role 0 or 1)
    Party {
        /// Party role: 0 or 1
        role: u64,
        /// Dealer address to connect to
        #[arg(long, default_value = "p2:9002")]
        dealer: String,
        /// Peer address P0 connects to
        #[arg(long, default_value = "p1:9001")]
        peer: String,
        /// Address P1 listens on for P0
        #[arg(long, default_value = "0.0.0.0:9001")]
        listen: String,
        /// Directory holding config, share and query files
        #[arg(long, default_value = "data")]
        data: PathBuf,
    },
    /// Run the correlated-randomness dealer
    Dealer {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:9002")]
        listen: String,
        /// Draw masks from {1..5} instead of uniformly (debugging only)
        #[arg(long)]
        readable_masks: bool,
    },
    /// Generate share and query files
    Setup {
        num_users: usize,
        num_items: usize,
        num_queries: usize,
        #[arg(long, default_value = "data")]
        data: PathBuf,
    },
    /// Reconstruct shares and replay all updates in the clear
    Verify {
        #[arg(long, default_value = "data")]
        data: PathBuf,
    },
}

async fn run_party(
    role: Role,
    dealer_addr: &str,
    peer_addr: &str,
    listen_addr: &str,
    data: &PathBuf,
) -> Result<(), Box<dyn Error>> {
    let config = ProtocolConfig::load(&data.join("config.txt"))?;

    let r = role.index();
    let u_shares =
        shares::load_share_vector(&data.join(format!("U{}_shares.txt", r)), config.num_users)?;
    let mut v_shares =
        shares::load_share_vector(&data.join(format!("V{}_shares.txt", r)), config.num_items)?;
    let queries = query::load_queries(
        &data.join(format!("queries_p{}.txt", r)),
        config.num_items as u64,
    )?;

    let mut dealer_stream = TcpStream::connect(dealer_addr).await?;
    send_field(&mut dealer_stream, role.index() as Field).await?;
    info!("{}: connected to dealer at {}", role, dealer_addr);

    let mut peer_stream = match role {
        Role::P0 => {
            let stream = TcpStream::connect(peer_addr).await?;
            info!("P0: connected to peer at {}", peer_addr);
            stream
        }
        Role::P1 => {
            let listener = TcpListener::bind(listen_addr).await?;
            let (stream, addr) = listener.accept().await?;
            info!("P1: accepted peer from {}", addr);
            stream
        }
    };

    info!("{}: processing {} queries", role, queries.len());
    party::process_queries(
        role,
        &mut peer_stream,
        &mut dealer_stream,
        &u_shares,
        &mut v_shares,
        &queries,
    )
    .await?;

    // Persist only after the whole run succeeded; a failed run leaves the
    // original share files untouched.
    let out_path = data.join(format!("V{}_shares_updated.txt", r));
    shares::save_share_vector(&out_path, &v_shares)?;
    info!("{}: wrote updated shares to {}", role, out_path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Party {
            role,
            dealer,
            peer,
            listen,
            data,
        } => {
            let role = Role::from_index(role).ok_or("role must be 0 or 1")?;
            run_party(role, &dealer, &peer, &listen, &data).await?;
        }
        Commands::Dealer {
            listen,
            readable_masks,
        } => {
            let sampling = if readable_masks {
                MaskSampling::Readable
            } else {
                MaskSampling::Uniform
            };
            dealer::run(&listen, sampling).await?;
        }
        Commands::Setup {
            num_users,
            num_items,
            num_queries,
            data,
        } => {
            setup::run(&data, num_users, num_items, num_queries)?;
        }
        Commands::Verify { data } => {
            if !verify::run(&data)? {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
