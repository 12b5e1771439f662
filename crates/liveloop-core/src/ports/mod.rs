//! Ports - 抽象化レイヤー
//!
//! テストで差し替えたいもの（時刻、ID 生成）だけを trait にする。

pub mod clock;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SharedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
