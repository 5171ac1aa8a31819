//! Correlated-randomness dealer (the helper party).
//!
//! Listens for exactly two connections, one per compute party. Each request
//! is a single field element naming a dimension; the reply is that party's
//! view of a preprocessing bundle. Bundles pair the two parties' request
//! streams through a per-dimension FIFO: the n-th bundle P0 receives for a
//! dimension is the same bundle as the n-th one P1 receives, provided both
//! parties request dimensions in the same logical order.

use std::collections::{HashMap, VecDeque};
use std::error::Error;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::field::{self, Field};
use crate::net;
use crate::Role;

/// How the dealer draws mask material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskSampling {
    /// Uniform over the full ring. The only sound choice for deployment.
    Uniform,
    /// Small values from {1..5}, so reconstructed intermediates stay
    /// readable while debugging. Breaks the masking argument.
    Readable,
}

impl MaskSampling {
    fn draw(self) -> Field {
        match self {
            MaskSampling::Uniform => field::random(),
            MaskSampling::Readable => field::small_random(),
        }
    }
}

#[derive(Debug)]
struct Bundle {
    x0: Vec<Field>,
    x1: Vec<Field>,
    y0: Vec<Field>,
    y1: Vec<Field>,
    alpha: Field,
    served_p0: bool,
    served_p1: bool,
}

/// One party's view of a bundle, ready to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleView {
    pub correction: Field,
    pub x: Vec<Field>,
    pub y: Vec<Field>,
}

/// Per-dimension FIFO queues of bundles pending their second consumer.
/// Owned by the dealer loop; the two connection tasks interleave
/// cooperatively on it.
#[derive(Debug)]
pub struct BundleStore {
    queues: HashMap<u64, VecDeque<Bundle>>,
    sampling: MaskSampling,
}

impl BundleStore {
    pub fn new(sampling: MaskSampling) -> Self {
        BundleStore {
            queues: HashMap::new(),
            sampling,
        }
    }

    fn fresh_bundle(&self, dimension: usize) -> Bundle {
        let draw_vec = |len: usize| (0..len).map(|_| self.sampling.draw()).collect::<Vec<_>>();
        Bundle {
            x0: draw_vec(dimension),
            x1: draw_vec(dimension),
            y0: draw_vec(dimension),
            y1: draw_vec(dimension),
            alpha: self.sampling.draw(),
            served_p0: false,
            served_p1: false,
        }
    }

    /// Serve one request: pair with the queue head if the other party has
    /// already consumed it, otherwise append a fresh bundle. Evict the head
    /// once both parties have their views.
    pub fn serve(&mut self, role: Role, dimension: usize) -> BundleView {
        let queue = self.queues.entry(dimension as u64).or_default();

        let pair_with_head = match queue.front() {
            Some(head) => match role {
                Role::P0 => head.served_p1 && !head.served_p0,
                Role::P1 => head.served_p0 && !head.served_p1,
            },
            None => false,
        };
        if !pair_with_head {
            let bundle = self.fresh_bundle(dimension);
            let queue = self.queues.get_mut(&(dimension as u64)).unwrap();
            queue.push_back(bundle);
        }

        let queue = self.queues.get_mut(&(dimension as u64)).unwrap();
        let index = if pair_with_head { 0 } else { queue.len() - 1 };
        let bundle = &mut queue[index];
        let view = match role {
            Role::P0 => {
                bundle.served_p0 = true;
                BundleView {
                    correction: field::add(field::dot(&bundle.x0, &bundle.y1), bundle.alpha),
                    x: bundle.x0.clone(),
                    y: bundle.y0.clone(),
                }
            }
            Role::P1 => {
                bundle.served_p1 = true;
                BundleView {
                    correction: field::sub(field::dot(&bundle.x1, &bundle.y0), bundle.alpha),
                    x: bundle.x1.clone(),
                    y: bundle.y1.clone(),
                }
            }
        };

        if let Some(head) = queue.front() {
            if head.served_p0 && head.served_p1 {
                queue.pop_front();
            }
        }
        view
    }
}

/// Serve one compute party's bundle requests until it hangs up.
pub async fn handle_party<S>(
    mut stream: S,
    role: Role,
    store: Arc<Mutex<BundleStore>>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let dimension = match net::recv_field(&mut stream).await {
            Ok(d) => d as usize,
            // A clean hangup after the last query is the normal shutdown.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                info!("{} disconnected", role);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if dimension == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} requested a zero-dimension bundle", role),
            ));
        }

        let view = store.lock().await.serve(role, dimension);
        debug!("{} served bundle of dimension {}", role, dimension);

        net::send_field(&mut stream, view.correction).await?;
        net::send_vector(&mut stream, &view.x).await?;
        net::send_vector(&mut stream, &view.y).await?;
    }
}

/// Bind the dealer port, accept both compute parties, and serve them until
/// they disconnect.
pub async fn run(listen: &str, sampling: MaskSampling) -> Result<(), Box<dyn Error>> {
    let listener = TcpListener::bind(listen).await?;
    info!("dealer listening on {}", listen);

    let (mut first, first_addr) = listener.accept().await?;
    let first_role = read_role(&mut first).await?;
    info!("accepted {} from {}", first_role, first_addr);

    let (mut second, second_addr) = listener.accept().await?;
    let second_role = read_role(&mut second).await?;
    info!("accepted {} from {}", second_role, second_addr);

    if first_role == second_role {
        return Err(format!("both connections declared role {}", first_role).into());
    }

    let store = Arc::new(Mutex::new(BundleStore::new(sampling)));
    let task_first = handle_party(first, first_role, Arc::clone(&store));
    let task_second = handle_party(second, second_role, Arc::clone(&store));
    tokio::try_join!(task_first, task_second)?;

    info!("both parties done, dealer shutting down");
    Ok(())
}

async fn read_role(stream: &mut tokio::net::TcpStream) -> Result<Role, Box<dyn Error>> {
    let code = net::recv_field(stream).await?;
    Role::from_index(code).ok_or_else(|| format!("invalid role handshake {}", code).into())
}
