
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

use crate::{Error, Result};


pub const CHANNEL_DEPTH:usize = 10;

pub enum BlockResult<U> {
	NotReady,
	Ready(U),
	Err(Error)
}

impl<U> BlockResult<U> {

	pub fn ready(self) -> Option<U> {
		match self {
			Self::Ready(u) => Some(u),
			_ => None
		}
	}

}

// A type that implements BlockFunctionality consumes instances of T and produces Ready(U) if an output is
// ready, NotReady if it isn't, or Err(_) if the operation fails.  Control values of type C reconfigure it.
pub trait BlockFunctionality<C: Clone, D, T: Clone, U> {

	fn control(&mut self, control:&C) -> Result<D>;
	fn apply(&mut self, input:&T) -> BlockResult<U>;

}

/// A `BlockFunctionality` running on its own tokio task, fed and drained through bounded channels
pub struct Block<C: 'static + Send, T: 'static + Send, U: 'static + Send> {
	pub tx_control: mpsc::Sender<C>,
	pub tx_input:   mpsc::Sender<T>,
	pub rx_output:  mpsc::Receiver<U>,
	pub handles:    Vec<JoinHandle<Result<()>>>,
}

impl<C: Send + Clone, T: Send + Clone, U: Send> Block<C, T, U> {

	pub fn from<B: 'static + BlockFunctionality<C, (), T, U> + Send>(b:B) -> Self {

		let (tx_control, mut rx_control) = mpsc::channel::<C>(CHANNEL_DEPTH);
		let (tx_input,   mut rx_input)   = mpsc::channel::<T>(CHANNEL_DEPTH);
		let (tx_output,  rx_output)      = mpsc::channel::<U>(CHANNEL_DEPTH);

		let handle:JoinHandle<Result<()>> = tokio::spawn(async move {

			let mut owned_b = b;

			'rx: while let Some(t) = rx_input.recv().await {

				// Control is only applied between inputs, so the block state needs no lock
				if let Ok(c) = rx_control.try_recv() {
					owned_b.control(&c)?;
				}

				match owned_b.apply(&t) {
					BlockResult::Ready(u) => tx_output.send(u).await.map_err(|_| Error::ChannelClosed)?,
					BlockResult::NotReady => (),
					BlockResult::Err(e)   => {
						error!("error in block: {}", e);
						break 'rx;
					}
				}

			}

			Ok(())
		});

		Block{ tx_control, tx_input, rx_output, handles: vec![handle] }
	}

	pub async fn send(&self, input:T) -> Result<()> {
		self.tx_input.send(input).await.map_err(|_| Error::ChannelClosed)
	}

	pub async fn control(&self, control:C) -> Result<()> {
		self.tx_control.send(control).await.map_err(|_| Error::ChannelClosed)
	}

	/// Closes the inputs and waits for the task to drain.  Outputs not yet received are returned.
	pub async fn shutdown(self) -> Result<Vec<U>> {

		let Block{ tx_control, tx_input, mut rx_output, handles } = self;

		drop(tx_control);
		drop(tx_input);

		let mut remaining = vec![];
		while let Some(u) = rx_output.recv().await {
			remaining.push(u);
		}

		for handle in handles {
			handle.await??;
		}

		Ok(remaining)
	}

}
