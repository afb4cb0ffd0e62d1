//! サブスクリプションプランのライフサイクル管理とリソース上限強制のコア
//!
//! プランカタログ（FREE / PRO / ULTIMATE）、契約の状態遷移
//! （トライアル・有効・解約予約・解約・期限切れ）、および
//! プラン上限の強制（ウォレット数・連携口座数）を提供します。
//! 認証と決済処理自体は上流に委譲し、本コアは検証済みのユーザーIDと
//! 決済ゲートウェイの抽象のみを受け取ります。

pub mod features;
pub mod shared;

use features::limits::guard::QuotaGate;
use features::payments::{DevelopmentPaymentGateway, PaymentGateway};
use features::subscriptions::service::SubscriptionService;
use log::info;
use rusqlite::Connection;
use shared::config::{initialize_logging_system, load_environment_variables};
use shared::database::connection::{create_in_memory_connection, initialize_database};
use shared::errors::{AppError, AppResult};
use std::sync::{Arc, Mutex, MutexGuard};

pub use shared::errors::ErrorResponse;

/// アプリケーションコンテキスト
///
/// 共有データベース接続と各サービスを束ねる状態。コマンド層の
/// すべての関数はこれを第一引数に受け取ります。
#[derive(Clone)]
pub struct AppContext {
    db: Arc<Mutex<Connection>>,
    pub subscriptions: SubscriptionService,
    pub gate: QuotaGate,
}

impl AppContext {
    /// 接続と決済ゲートウェイからコンテキストを構築する
    ///
    /// # 引数
    /// * `conn` - 初期化済みのデータベース接続
    /// * `payments` - 決済ゲートウェイの実装
    pub fn new(conn: Connection, payments: Arc<dyn PaymentGateway>) -> Self {
        let db = Arc::new(Mutex::new(conn));
        let subscriptions = SubscriptionService::new(db.clone(), payments);
        let gate = QuotaGate::new(db.clone());

        Self {
            db,
            subscriptions,
            gate,
        }
    }

    /// 環境に応じた永続データベースでコンテキストを初期化する
    ///
    /// 環境変数の読み込み、ログシステムの初期化、テーブル作成までを
    /// 行います。アプリケーション起動時に一度だけ呼び出してください。
    pub fn initialize() -> AppResult<Self> {
        load_environment_variables();
        initialize_logging_system();

        info!("アプリケーションコンテキストの初期化を開始します...");
        let conn = initialize_database()?;
        info!("データベースの初期化が完了しました");

        Ok(Self::new(conn, Arc::new(DevelopmentPaymentGateway::new())))
    }

    /// インメモリデータベースでコンテキストを構築する（テスト・開発用）
    pub fn in_memory() -> AppResult<Self> {
        let conn = create_in_memory_connection()?;
        Ok(Self::new(conn, Arc::new(DevelopmentPaymentGateway::new())))
    }

    /// 共有接続のロックを取得する
    pub fn lock_db(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| AppError::internal("データベースロックの取得に失敗"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_context_is_usable() {
        let ctx = AppContext::in_memory().unwrap();

        // テーブルが作成済みで、各サービスが同じ接続を共有している
        let wallet = features::wallets::create_wallet(
            &ctx,
            Some(1),
            features::wallets::CreateWalletDto {
                name: "生活費".to_string(),
                currency: None,
            },
        )
        .unwrap();
        assert_eq!(wallet.user_id, 1);

        let result = ctx
            .gate
            .check_limits(Some(1), features::plans::ResourceKind::Wallet)
            .unwrap();
        assert_eq!(result.current_count, Some(1));
    }

    #[test]
    fn test_context_clone_shares_connection() {
        let ctx = AppContext::in_memory().unwrap();
        let clone = ctx.clone();

        features::wallets::create_wallet(
            &ctx,
            Some(1),
            features::wallets::CreateWalletDto {
                name: "生活費".to_string(),
                currency: None,
            },
        )
        .unwrap();

        let wallets = features::wallets::get_wallets(&clone, Some(1)).unwrap();
        assert_eq!(wallets.len(), 1);
    }
}
