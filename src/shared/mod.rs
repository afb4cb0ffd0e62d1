/// 共有モジュール
///
/// このモジュールは、アプリケーション全体で共有されるコードを提供します：
/// - 統一エラーハンドリング（AppError / ErrorResponse）
/// - 環境設定とログ初期化
/// - データベース接続とスキーマ管理
pub mod config;
pub mod database;
pub mod errors;
