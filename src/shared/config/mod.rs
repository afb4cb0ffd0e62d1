/// 設定共有モジュール
///
/// 実行環境の判定、環境変数の読み込み、ログシステムの初期化を提供します。
pub mod environment;

pub use environment::{
    get_database_filename, get_environment, initialize_logging_system, load_environment_variables,
    Environment, EnvironmentConfig,
};
