/// データベース共有モジュール
///
/// 接続の初期化、スキーマ作成、テスト用インメモリ接続を提供します。
pub mod connection;
