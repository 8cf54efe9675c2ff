//! Domain model (ids, entries, orders, notification events, outcomes, errors).

pub mod entry;
pub mod errors;
pub mod ids;
pub mod notification;
pub mod order;
pub mod outcome;

pub use self::entry::{Entry, PendingEntry};
pub use self::errors::{
    CodecError, ConfigError, CourierError, ErrorKind, ProducerError, SendError, StoreError,
};
pub use self::ids::{ConsumerId, EntryId, ParseEntryIdError};
pub use self::notification::{CREATED_AT_FORMAT, MARKETING_SMS, NotificationEvent};
pub use self::order::Order;
pub use self::outcome::EntryOutcome;
