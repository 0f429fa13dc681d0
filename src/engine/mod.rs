//! Движок экспорта и импорта таблиц.
//!
//! - `storage`: контракт хранилища таблиц, записи, транзакции и аренда;
//! - `schema`: описание таблицы и разбор первичного ключа;
//! - `memory`: эталонное хранилище в памяти;
//! - `dump`: формат контейнера, кодек типов, потоковые чтение и запись.

pub mod dump;
pub mod memory;
pub mod schema;
pub mod storage;

pub use dump::*;
pub use memory::*;
pub use schema::*;
pub use storage::*;
