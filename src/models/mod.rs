pub mod credit;
pub mod event;
pub mod purchase;
pub mod square;

pub use credit::{CreditStatus, PaymentCredit};
pub use event::{Event, EventStatus};
pub use purchase::SquarePurchase;
pub use square::{Square, SquareStatus};
