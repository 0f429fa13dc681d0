//! Модель значений записей.
//!
//! - `types`: [`Value`]: значение записи, включая экзотические типы.
//! - `key`: [`RecordKey`]: первичный ключ с полным порядком.

pub mod key;
pub mod types;

pub use key::*;
pub use types::*;
