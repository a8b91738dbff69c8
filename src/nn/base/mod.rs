//! Building blocks shared by every model: parameters, nonlinearities,
//! initialisation, the message-passing [`Conv`], losses and optimizers.

pub mod activation;
pub mod aggregation;
pub mod conv;
pub mod init;
pub mod linear;
pub mod loss;
pub mod optim;
pub mod parameter;

pub use activation::Activation;
pub use aggregation::{AggrFunc, Aggregation};
pub use conv::{Conv, ConvGrads, ConvOptions};
pub use init::{DEFAULT_GAIN, Initialization};
pub use linear::Linear;
pub use loss::Loss;
pub use optim::{Adam, Optimizer, Sgd};
pub use parameter::{Parameter, Parametrized};
