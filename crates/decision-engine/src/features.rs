//! 特征预处理
//!
//! 从原始交易记录派生各业务域的特征映射，规则通过 `preprocessed.<key>` 引用。
//! 预处理无状态：历史类特征（如用户平均金额）由客户端上下文提供。

use chrono::{NaiveDateTime, Timelike};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::record::{
    BankTransaction, ECommerceTransaction, MobileMoneyTransaction, TransactionRecord,
};
use crate::value::{FeatureMap, FieldValue};

/// 比率分母的平滑项，避免除零
const RATIO_EPSILON: f64 = 1e-6;
/// 金额占余额超过该比例视为掏空账户
const ACCOUNT_DRAIN_RATIO: f64 = 0.9;
/// 移动支付时间戳格式
const MOBILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// 入账类交易，余额增加
const INFLOW_TYPES: [&str; 2] = ["cash_in", "receive_money"];

/// 按记录所属业务域派生特征
pub fn preprocess(record: &TransactionRecord) -> Result<FeatureMap> {
    let features = match record {
        TransactionRecord::Bank(r) => preprocess_bank(r)?,
        TransactionRecord::ECommerce(r) => preprocess_ecommerce(r)?,
        TransactionRecord::MobileMoney(r) => preprocess_mobile_money(r)?,
    };
    debug!(
        domain = %record.domain(),
        feature_count = features.len(),
        "特征预处理完成"
    );
    Ok(features)
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    numerator / (denominator + RATIO_EPSILON)
}

fn missing_context(domain: &str) -> EngineError {
    EngineError::Preprocess(format!("{} 交易缺少 clientContext", domain))
}

pub fn preprocess_bank(raw: &BankTransaction) -> Result<FeatureMap> {
    let ctx = raw.client_context.as_ref().ok_or_else(|| missing_context("bank"))?;
    let mut features = FeatureMap::new();

    features.insert("transaction_amount".into(), raw.transaction_amount.into());
    features.insert("balance_before".into(), ctx.balance_before.into());
    features.insert("velocity_txn_count_1h".into(), ctx.velocity_txn_count_1h.into());
    features.insert("avg_txn_amt_for_user".into(), ctx.avg_txn_amt_for_user.into());
    features.insert(
        "time_since_last_txn_seconds".into(),
        ctx.time_since_last_txn_seconds.into(),
    );
    features.insert(
        "amount_to_balance_ratio".into(),
        ratio(raw.transaction_amount, ctx.balance_before).into(),
    );
    features.insert(
        "amount_vs_user_avg_ratio".into(),
        ratio(raw.transaction_amount, ctx.avg_txn_amt_for_user).into(),
    );
    features.insert("is_new_device".into(), ctx.is_new_device.into());
    features.insert("is_foreign_location".into(), ctx.is_foreign_location.into());
    features.insert("is_night".into(), ctx.is_night.into());
    features.insert("transaction_type".into(), raw.transaction_type.clone().into());

    Ok(features)
}

pub fn preprocess_ecommerce(raw: &ECommerceTransaction) -> Result<FeatureMap> {
    let ctx = raw
        .client_context
        .as_ref()
        .ok_or_else(|| missing_context("ecommerce"))?;
    let mut features = FeatureMap::new();

    // 直通字段，键名为小写拼接
    features.insert("transactionamount".into(), raw.transaction_amount.into());
    features.insert("itemcount".into(), raw.item_count.into());
    features.insert("accountageindays".into(), raw.account_age_in_days.into());
    features.insert("currency".into(), raw.currency.clone().into());
    features.insert("productcategory".into(), raw.product_category.clone().into());
    features.insert("emaildomain".into(), raw.email_domain.clone().into());
    features.insert("shippingcountry".into(), raw.shipping_country.clone().into());
    features.insert("billingcountry".into(), raw.billing_country.clone().into());
    features.insert("paymentmethod".into(), raw.payment_method.clone().into());
    features.insert("ipaddresscountry".into(), raw.ip_address_country.clone().into());

    features.insert(
        "time_since_last_txn_seconds".into(),
        ctx.time_since_last_txn_seconds.into(),
    );
    features.insert("avg_txn_amt_for_user".into(), ctx.avg_txn_amt_for_user.into());
    features.insert(
        "amount_vs_user_avg_ratio".into(),
        ratio(raw.transaction_amount, ctx.avg_txn_amt_for_user).into(),
    );

    features.insert("isguestcheckout".into(), raw.is_guest_checkout.into());
    let billing_equals_shipping = match (&raw.billing_country, &raw.shipping_country) {
        (Some(billing), Some(shipping)) => billing.eq_ignore_ascii_case(shipping),
        _ => false,
    };
    features.insert("billingequalsshipping".into(), billing_equals_shipping.into());

    Ok(features)
}

pub fn preprocess_mobile_money(raw: &MobileMoneyTransaction) -> Result<FeatureMap> {
    let ctx = raw
        .client_context
        .as_ref()
        .ok_or_else(|| missing_context("mobile_money"))?;
    let mut features = FeatureMap::new();

    features.insert("transaction_amount".into(), raw.transaction_amount.into());
    features.insert("balance_before".into(), raw.balance_before.into());
    features.insert("velocity_txn_count_1h".into(), ctx.velocity_txn_count_1h.into());
    features.insert(
        "time_since_last_txn_seconds".into(),
        ctx.time_since_last_txn_seconds.into(),
    );
    features.insert("transaction_type".into(), raw.transaction_type.clone().into());
    features.insert("currency".into(), ctx.currency.clone().into());
    features.insert("country".into(), ctx.country.clone().into());
    features.insert("avg_txn_amt_for_user".into(), ctx.avg_txn_amt_for_user.into());

    let is_inflow = raw
        .transaction_type
        .as_deref()
        .is_some_and(|t| INFLOW_TYPES.contains(&t));
    let balance_after = if is_inflow {
        raw.balance_before + raw.transaction_amount
    } else {
        raw.balance_before - raw.transaction_amount
    };
    features.insert("balance_after".into(), balance_after.into());

    let amount_to_balance = ratio(raw.transaction_amount, raw.balance_before);
    features.insert("amount_to_balance_ratio".into(), amount_to_balance.into());
    features.insert(
        "is_account_drain".into(),
        (amount_to_balance > ACCOUNT_DRAIN_RATIO).into(),
    );
    features.insert(
        "amount_vs_user_avg_ratio".into(),
        ratio(raw.transaction_amount, ctx.avg_txn_amt_for_user).into(),
    );

    features.insert("is_night".into(), is_night(raw.timestamp.as_deref()).into());
    features.insert("is_new_device".into(), ctx.is_new_device.into());
    features.insert("is_foreign_location".into(), ctx.is_foreign_location.into());

    Ok(features)
}

/// 0-5 点或 23 点视为夜间；时间戳无法解析时为 false
fn is_night(timestamp: Option<&str>) -> bool {
    let Some(ts) = timestamp else {
        warn!("缺少时间戳，is_night 默认为 false");
        return false;
    };
    match NaiveDateTime::parse_from_str(ts, MOBILE_TIMESTAMP_FORMAT) {
        Ok(dt) => dt.hour() < 6 || dt.hour() > 22,
        Err(_) => {
            warn!(timestamp = ts, "时间戳无法解析，is_night 默认为 false");
            false
        }
    }
}

/// 取出数值特征
pub fn number(features: &FeatureMap, key: &str) -> Option<f64> {
    features.get(key).and_then(FieldValue::as_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{BankClientContext, ECommerceClientContext, MobileMoneyClientContext};

    fn mobile(transaction_type: &str, timestamp: &str) -> MobileMoneyTransaction {
        MobileMoneyTransaction {
            transaction_amount: 950.0,
            balance_before: 1000.0,
            transaction_type: Some(transaction_type.to_string()),
            timestamp: Some(timestamp.to_string()),
            client_context: Some(MobileMoneyClientContext {
                avg_txn_amt_for_user: 100.0,
                currency: Some("GHS".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_bank_features() {
        let raw = BankTransaction {
            transaction_amount: 500.0,
            transaction_type: Some("transfer".to_string()),
            client_context: Some(BankClientContext {
                balance_before: 1000.0,
                avg_txn_amt_for_user: 250.0,
                is_night: true,
                ..Default::default()
            }),
            ..Default::default()
        };

        let features = preprocess(&raw.into()).unwrap();
        assert!((number(&features, "amount_to_balance_ratio").unwrap() - 0.5).abs() < 1e-6);
        assert!((number(&features, "amount_vs_user_avg_ratio").unwrap() - 2.0).abs() < 1e-6);
        assert_eq!(features["is_night"], FieldValue::Bool(true));
        assert_eq!(features["transaction_type"], FieldValue::from("transfer"));
    }

    #[test]
    fn test_missing_context_is_error() {
        let err = preprocess(&BankTransaction::default().into()).unwrap_err();
        assert_eq!(err.code(), "PREPROCESS_FAILED");
        assert!(preprocess(&ECommerceTransaction::default().into()).is_err());
        assert!(preprocess(&MobileMoneyTransaction::default().into()).is_err());
    }

    #[test]
    fn test_ecommerce_billing_equals_shipping() {
        let mut raw = ECommerceTransaction {
            transaction_amount: 80.0,
            billing_country: Some("gb".to_string()),
            shipping_country: Some("GB".to_string()),
            client_context: Some(ECommerceClientContext {
                time_since_last_txn_seconds: -1.0,
                avg_txn_amt_for_user: 40.0,
            }),
            ..Default::default()
        };

        let features = preprocess_ecommerce(&raw).unwrap();
        assert_eq!(features["billingequalsshipping"], FieldValue::Bool(true));
        assert_eq!(features["time_since_last_txn_seconds"], FieldValue::Number(-1.0));
        assert!(features["currency"].is_null());

        raw.billing_country = None;
        let features = preprocess_ecommerce(&raw).unwrap();
        assert_eq!(features["billingequalsshipping"], FieldValue::Bool(false));
    }

    #[test]
    fn test_mobile_money_balance_after() {
        let features = preprocess_mobile_money(&mobile("cash_in", "2025-03-26 12:00:00")).unwrap();
        assert_eq!(number(&features, "balance_after"), Some(1950.0));

        let features =
            preprocess_mobile_money(&mobile("send_money", "2025-03-26 12:00:00")).unwrap();
        assert_eq!(number(&features, "balance_after"), Some(50.0));
        assert_eq!(features["is_account_drain"], FieldValue::Bool(true));
        assert_eq!(features["currency"], FieldValue::from("GHS"));
    }

    #[test]
    fn test_mobile_money_is_night() {
        let at = |ts: &str| {
            let features = preprocess_mobile_money(&mobile("send_money", ts)).unwrap();
            features["is_night"].as_bool().unwrap()
        };

        assert!(at("2025-03-26 23:15:00"));
        assert!(at("2025-03-26 05:59:59"));
        assert!(!at("2025-03-26 06:00:00"));
        assert!(!at("2025-03-26 22:59:59"));
        assert!(!at("2025-03-26T23:15:00"));
    }
}
