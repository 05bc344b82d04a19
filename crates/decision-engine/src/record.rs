//! 交易记录与字段访问能力
//!
//! 解析器不依赖运行时反射：每种记录通过 [`FieldHolder`] 暴露一张显式的
//! 访问器表，访问器名沿用 `getX` / `isX` 的命名习惯，规则作者写的路径
//! （如 `rawInput.clientContext.newDevice`）因此在所有记录上行为一致。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, Result};
use crate::value::FieldValue;

/// 访问器返回值：标量字段或嵌套记录
pub enum FieldRef<'a> {
    Value(FieldValue),
    Nested(&'a dyn FieldHolder),
}

/// 可按名称访问字段的记录
pub trait FieldHolder: Send + Sync {
    /// 按访问器名取值，未知名称返回 None
    fn accessor(&self, name: &str) -> Option<FieldRef<'_>>;

    /// 记录类型名，路径停在嵌套记录上时作为解析结果
    fn type_name(&self) -> &'static str;
}

fn nested<T: FieldHolder>(holder: Option<&T>) -> FieldRef<'_> {
    match holder {
        Some(h) => FieldRef::Nested(h),
        None => FieldRef::Value(FieldValue::Null),
    }
}

fn value(v: impl Into<FieldValue>) -> Option<FieldRef<'static>> {
    Some(FieldRef::Value(v.into()))
}

/// 业务域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Bank,
    ECommerce,
    MobileMoney,
}

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::Bank, Domain::ECommerce, Domain::MobileMoney];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bank => "bank",
            Self::ECommerce => "ecommerce",
            Self::MobileMoney => "mobile_money",
        }
    }
}

impl FromStr for Domain {
    type Err = EngineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bank" => Ok(Self::Bank),
            "ecommerce" => Ok(Self::ECommerce),
            "mobile_money" => Ok(Self::MobileMoney),
            _ => Err(EngineError::UnknownDomain(s.to_string())),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// 银行
// ============================================================================

/// 银行交易
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BankTransaction {
    pub user_id: Option<String>,
    pub transaction_amount: f64,
    pub transaction_type: Option<String>,
    /// 如 "2025-03-26T07:46:59"
    pub timestamp: Option<String>,
    pub currency: Option<String>,
    pub client_context: Option<BankClientContext>,
}

/// 银行交易的客户端上下文（snake_case 字段名）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BankClientContext {
    pub balance_before: f64,
    pub is_new_device: bool,
    pub is_foreign_location: bool,
    pub is_night: bool,
    pub velocity_txn_count_1h: i64,
    pub avg_txn_amt_for_user: f64,
    pub time_since_last_txn_seconds: i64,
    pub account_age_days: i64,
    pub is_new_beneficiary: bool,
    pub is_using_vpn_proxy: bool,
    pub hour_of_day: i64,
}

impl FieldHolder for BankTransaction {
    fn accessor(&self, name: &str) -> Option<FieldRef<'_>> {
        match name {
            "getUserId" => value(self.user_id.clone()),
            "getTransactionAmount" => value(self.transaction_amount),
            "getTransactionType" => value(self.transaction_type.clone()),
            "getTimestamp" => value(self.timestamp.clone()),
            "getCurrency" => value(self.currency.clone()),
            "getClientContext" => Some(nested(self.client_context.as_ref())),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        "BankTransaction"
    }
}

impl FieldHolder for BankClientContext {
    fn accessor(&self, name: &str) -> Option<FieldRef<'_>> {
        match name {
            "getBalanceBefore" => value(self.balance_before),
            "isNewDevice" => value(self.is_new_device),
            "isForeignLocation" => value(self.is_foreign_location),
            "isNight" => value(self.is_night),
            "getVelocityTxnCount1h" => value(self.velocity_txn_count_1h),
            "getAvgTxnAmtForUser" => value(self.avg_txn_amt_for_user),
            "getTimeSinceLastTxnSeconds" => value(self.time_since_last_txn_seconds),
            "getAccountAgeDays" => value(self.account_age_days),
            "isNewBeneficiary" => value(self.is_new_beneficiary),
            "isUsingVpnProxy" => value(self.is_using_vpn_proxy),
            "getHourOfDay" => value(self.hour_of_day),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        "BankClientContext"
    }
}

// ============================================================================
// 电商
// ============================================================================

/// 电商订单交易
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ECommerceTransaction {
    pub transaction_amount: f64,
    pub currency: Option<String>,
    pub item_count: i64,
    pub product_category: Option<String>,
    pub payment_method: Option<String>,
    pub user_id: Option<String>,
    pub ip_address_country: Option<String>,
    pub is_guest_checkout: bool,
    pub account_age_in_days: i64,
    pub email_domain: Option<String>,
    pub shipping_country: Option<String>,
    pub billing_country: Option<String>,
    pub client_context: Option<ECommerceClientContext>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ECommerceClientContext {
    pub time_since_last_txn_seconds: f64,
    pub avg_txn_amt_for_user: f64,
}

impl FieldHolder for ECommerceTransaction {
    fn accessor(&self, name: &str) -> Option<FieldRef<'_>> {
        match name {
            "getTransactionAmount" => value(self.transaction_amount),
            "getCurrency" => value(self.currency.clone()),
            "getItemCount" => value(self.item_count),
            "getProductCategory" => value(self.product_category.clone()),
            "getPaymentMethod" => value(self.payment_method.clone()),
            "getUserId" => value(self.user_id.clone()),
            "getIpAddressCountry" => value(self.ip_address_country.clone()),
            "isGuestCheckout" => value(self.is_guest_checkout),
            "getAccountAgeInDays" => value(self.account_age_in_days),
            "getEmailDomain" => value(self.email_domain.clone()),
            "getShippingCountry" => value(self.shipping_country.clone()),
            "getBillingCountry" => value(self.billing_country.clone()),
            "getClientContext" => Some(nested(self.client_context.as_ref())),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        "ECommerceTransaction"
    }
}

impl FieldHolder for ECommerceClientContext {
    fn accessor(&self, name: &str) -> Option<FieldRef<'_>> {
        match name {
            "getTimeSinceLastTxnSeconds" => value(self.time_since_last_txn_seconds),
            "getAvgTxnAmtForUser" => value(self.avg_txn_amt_for_user),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        "ECommerceClientContext"
    }
}

// ============================================================================
// 移动支付
// ============================================================================

/// 移动支付交易
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MobileMoneyTransaction {
    pub user_id: Option<String>,
    pub recipient_id: Option<String>,
    pub transaction_amount: f64,
    pub transaction_type: Option<String>,
    /// 格式 "yyyy-MM-dd HH:mm:ss"
    pub timestamp: Option<String>,
    pub balance_before: f64,
    pub client_context: Option<MobileMoneyClientContext>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MobileMoneyClientContext {
    pub is_new_device: bool,
    pub is_foreign_location: bool,
    pub velocity_txn_count_1h: i64,
    pub avg_txn_amt_for_user: f64,
    pub time_since_last_txn_seconds: i64,
    pub currency: Option<String>,
    pub country: Option<String>,
}

impl FieldHolder for MobileMoneyTransaction {
    fn accessor(&self, name: &str) -> Option<FieldRef<'_>> {
        match name {
            "getUserId" => value(self.user_id.clone()),
            "getRecipientId" => value(self.recipient_id.clone()),
            "getTransactionAmount" => value(self.transaction_amount),
            "getTransactionType" => value(self.transaction_type.clone()),
            "getTimestamp" => value(self.timestamp.clone()),
            "getBalanceBefore" => value(self.balance_before),
            "getClientContext" => Some(nested(self.client_context.as_ref())),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        "MobileMoneyTransaction"
    }
}

impl FieldHolder for MobileMoneyClientContext {
    fn accessor(&self, name: &str) -> Option<FieldRef<'_>> {
        match name {
            "isNewDevice" => value(self.is_new_device),
            "isForeignLocation" => value(self.is_foreign_location),
            "getVelocityTxnCount1h" => value(self.velocity_txn_count_1h),
            "getAvgTxnAmtForUser" => value(self.avg_txn_amt_for_user),
            "getTimeSinceLastTxnSeconds" => value(self.time_since_last_txn_seconds),
            "getCurrency" => value(self.currency.clone()),
            "getCountry" => value(self.country.clone()),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        "MobileMoneyClientContext"
    }
}

// ============================================================================
// 统一记录
// ============================================================================

/// 任一业务域的交易记录
#[derive(Debug, Clone)]
pub enum TransactionRecord {
    Bank(BankTransaction),
    ECommerce(ECommerceTransaction),
    MobileMoney(MobileMoneyTransaction),
}

impl TransactionRecord {
    /// 按业务域反序列化交易记录，未知字段忽略
    pub fn from_json(domain: Domain, value: serde_json::Value) -> Result<Self> {
        let record = match domain {
            Domain::Bank => Self::Bank(serde_json::from_value(value)?),
            Domain::ECommerce => Self::ECommerce(serde_json::from_value(value)?),
            Domain::MobileMoney => Self::MobileMoney(serde_json::from_value(value)?),
        };
        Ok(record)
    }

    pub fn domain(&self) -> Domain {
        match self {
            Self::Bank(_) => Domain::Bank,
            Self::ECommerce(_) => Domain::ECommerce,
            Self::MobileMoney(_) => Domain::MobileMoney,
        }
    }

    pub fn as_holder(&self) -> &dyn FieldHolder {
        match self {
            Self::Bank(r) => r,
            Self::ECommerce(r) => r,
            Self::MobileMoney(r) => r,
        }
    }
}

impl From<BankTransaction> for TransactionRecord {
    fn from(record: BankTransaction) -> Self {
        Self::Bank(record)
    }
}

impl From<ECommerceTransaction> for TransactionRecord {
    fn from(record: ECommerceTransaction) -> Self {
        Self::ECommerce(record)
    }
}

impl From<MobileMoneyTransaction> for TransactionRecord {
    fn from(record: MobileMoneyTransaction) -> Self {
        Self::MobileMoney(record)
    }
}
