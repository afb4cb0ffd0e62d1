/// サブスクリプションライフサイクル機能モジュール
///
/// このモジュールは、サブスクリプションの状態機械に関連するすべての機能を提供します：
/// - 契約・変更・アップグレード・ダウングレード・解約・再開
/// - 期間更新と期限切れ（外部スケジューラーが呼ぶ）
/// - 追記専用の履歴記録と取得
/// - 楽観的排他制御によるサブスクリプション更新の直列化
pub mod commands;
pub mod models;
pub mod repository;
pub mod service;

// 公開インターフェース
pub use commands::{
    cancel_subscription, create_subscription, downgrade_subscription, get_current_subscription,
    get_subscription_history, reactivate_subscription, update_subscription, upgrade_subscription,
};

pub use models::{
    CreateSubscriptionDto, HistoryAction, Subscription, SubscriptionHistoryEntry,
    SubscriptionStatus, UpdateSubscriptionDto,
};

pub use service::SubscriptionService;
