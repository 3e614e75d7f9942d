pub mod analysis;
pub mod enums;
pub mod patient;
pub mod session;
pub mod turn;

pub use analysis::*;
pub use enums::*;
pub use patient::*;
pub use session::*;
pub use turn::*;
