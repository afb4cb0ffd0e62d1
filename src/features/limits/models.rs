use crate::features::plans::{LimitValue, ResourceKind};
use serde::{Deserialize, Serialize};

/// 上限チェックの結果（呼び出しごとに生成、永続化しない）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitCheckResult {
    /// もう1件作成できるか
    pub allowed: bool,
    pub resource_kind: ResourceKind,
    /// 現在の件数（無制限プランでは使用数を読まないためNone）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_count: Option<i64>,
    pub limit: LimitValue,
    pub remaining: LimitValue,
}
