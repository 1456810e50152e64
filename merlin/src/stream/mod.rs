//! Result streams of the static surface.

mod count_stream;
mod model_stream;
pub(crate) mod populate;

pub use count_stream::CountStream;
pub use model_stream::{Materialize, ModelStream};
