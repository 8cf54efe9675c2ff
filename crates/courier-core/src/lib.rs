//! courier-core
//!
//! Core building blocks for the order notification pipeline.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, entry, order, notification, outcome, errors）
//! - **ports**: 抽象化レイヤー（StreamStore, NotificationSender, PhoneDirectory, FailureHandler, Clock）
//! - **impls**: 実装（InMemoryStreamStore, RedisStreamStore, LogSender など）
//! - **app**: アプリケーションロジック（producer, processor, worker_loop, pool, reclaim_loop, builder）
//! - **codec**: NotificationEvent ⇔ payload
//! - **config**: TOML 設定
//! - **observability**: tracing の初期化とワーカー統計

pub mod app;
pub mod codec;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
