// 統一されたエラーハンドリングシステム
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// アプリケーション全体で使用される統一エラー型
///
/// 各バリアントはビジネスルール違反または内部障害を表します。
/// 境界層（コマンド）では `ErrorResponse` に変換してから呼び出し元へ返します。
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum AppError {
    // 認証関連エラー
    #[error("認証されていません")]
    Unauthenticated,

    // リソース関連エラー
    #[error("{0}が見つかりません")]
    NotFound(String),

    #[error("競合が発生しました: {0}")]
    Conflict(String),

    // バリデーション関連エラー
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    // サブスクリプション状態関連エラー
    #[error("無効な状態です: {0}")]
    InvalidState(String),

    #[error("無効なプラン変更です: {0}")]
    InvalidTransition(String),

    // プラン上限関連エラー
    #[error("リソース上限を超過しました: {resource_kind}（上限: {limit}、現在: {current_count}）")]
    LimitExceeded {
        resource_kind: String,
        limit: i64,
        current_count: i64,
    },

    // 決済関連エラー
    #[error("決済に失敗しました: {0}")]
    PaymentFailed(String),

    // データベース関連エラー
    #[error("データベースエラー: {0}")]
    Database(String),

    // 設定関連エラー
    #[error("設定エラー: {0}")]
    Configuration(String),

    // その他の内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

/// アプリケーション全体で使用される統一Result型
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// バリデーションエラーを作成
    pub fn validation<S: Into<String>>(message: S) -> Self {
        AppError::Validation(message.into())
    }

    /// リソース未検出エラーを作成
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        AppError::NotFound(resource.into())
    }

    /// 競合エラーを作成
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        AppError::Conflict(message.into())
    }

    /// 状態エラーを作成
    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        AppError::InvalidState(message.into())
    }

    /// プラン変更エラーを作成
    pub fn invalid_transition<S: Into<String>>(message: S) -> Self {
        AppError::InvalidTransition(message.into())
    }

    /// 上限超過エラーを作成
    pub fn limit_exceeded<S: Into<String>>(resource_kind: S, limit: i64, current_count: i64) -> Self {
        AppError::LimitExceeded {
            resource_kind: resource_kind.into(),
            limit,
            current_count,
        }
    }

    /// 決済エラーを作成
    pub fn payment<S: Into<String>>(message: S) -> Self {
        AppError::PaymentFailed(message.into())
    }

    /// 内部エラーを作成
    pub fn internal<S: Into<String>>(message: S) -> Self {
        AppError::Internal(message.into())
    }

    /// 機械可読なエラーコードを取得
    ///
    /// # 戻り値
    /// スクリーミングスネークケースの安定したエラーコード。
    /// 呼び出し側はこのコードで分岐できます（メッセージ文字列には依存しないこと）。
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "UNAUTHENTICATED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            AppError::PaymentFailed(_) => "PAYMENT_FAILED",
            // 内部障害はすべて同一コードに集約（詳細はログのみに残す）
            AppError::Database(_) | AppError::Configuration(_) | AppError::Internal(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    /// ユーザーフレンドリーなエラーメッセージを取得
    ///
    /// 内部障害（データベース・設定・その他）は詳細を隠し、
    /// 定型メッセージに置き換えます。詳細はログにのみ記録されます。
    pub fn user_message(&self) -> String {
        match self {
            AppError::Unauthenticated => "ログインが必要です。".to_string(),
            AppError::NotFound(resource) => format!("{resource}が見つかりません。"),
            AppError::Conflict(message) => message.clone(),
            AppError::Validation(message) => message.clone(),
            AppError::InvalidState(message) => message.clone(),
            AppError::InvalidTransition(message) => message.clone(),
            AppError::LimitExceeded {
                resource_kind,
                limit,
                current_count,
            } => format!(
                "現在のプランの上限に達しました（{resource_kind}: {current_count}/{limit}）。上位プランへのアップグレードをご検討ください。"
            ),
            AppError::PaymentFailed(message) => {
                format!("決済処理に失敗しました: {message}")
            }
            AppError::Database(_) | AppError::Configuration(_) | AppError::Internal(_) => {
                "内部エラーが発生しました。しばらく時間をおいて再試行してください。".to_string()
            }
        }
    }

    /// エラーの重要度を取得
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AppError::Configuration(_) => ErrorSeverity::Critical,
            AppError::Database(_) => ErrorSeverity::High,
            AppError::Internal(_) => ErrorSeverity::High,
            AppError::PaymentFailed(_) => ErrorSeverity::High,
            AppError::Conflict(_) => ErrorSeverity::Medium,
            AppError::Unauthenticated => ErrorSeverity::Medium,
            AppError::NotFound(_) => ErrorSeverity::Low,
            AppError::Validation(_) => ErrorSeverity::Low,
            AppError::InvalidState(_) => ErrorSeverity::Low,
            AppError::InvalidTransition(_) => ErrorSeverity::Low,
            AppError::LimitExceeded { .. } => ErrorSeverity::Low,
        }
    }

    /// 上限超過エラーの構造化データを取得
    ///
    /// # 戻り値
    /// `LimitExceeded` の場合のみ `Some`。呼び出し側UIが
    /// 残数表示やアップグレード導線の描画に使用します。
    pub fn limit_details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::LimitExceeded {
                resource_kind,
                limit,
                current_count,
            } => Some(serde_json::json!({
                "resource_kind": resource_kind,
                "limit": limit,
                "current_count": current_count,
            })),
            _ => None,
        }
    }
}

/// エラーの重要度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

// rusqliteエラーからの変換
impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        AppError::Database(error.to_string())
    }
}

// 文字列への変換（簡易な境界で使用）
impl From<AppError> for String {
    fn from(error: AppError) -> Self {
        error.user_message()
    }
}

/// 境界層の統一エラー封筒
///
/// コマンド層はすべてのエラーをこの形に変換して返します。
/// `code` は `AppError::error_code` と同一の安定コードです。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        // 重要度に応じてログレベルを変更
        match error.severity() {
            ErrorSeverity::Critical | ErrorSeverity::High => {
                log::error!("エラー発生: {error}");
            }
            ErrorSeverity::Medium => {
                log::warn!("エラー発生: {error}");
            }
            ErrorSeverity::Low => {
                log::info!("エラー発生: {error}");
            }
        }

        ErrorResponse {
            code: error.error_code().to_string(),
            message: error.user_message(),
            details: error.limit_details(),
        }
    }
}
