/// 決済連携機能モジュール
///
/// このモジュールは、外部決済コラボレーターとの連携ポートを提供します：
/// - 課金・返金・プラン変更差額の要求モデル
/// - 決済ゲートウェイのトレイトと開発用実装
/// - 支払い方法トークンの形式検証
pub mod gateway;
pub mod models;

// 公開インターフェース
pub use gateway::{validate_payment_method_token, DevelopmentPaymentGateway, PaymentGateway};

pub use models::{ChargeKind, ChargeRequest, PaymentReceipt};
