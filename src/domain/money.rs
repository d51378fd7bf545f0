// ==========================================
// 合作社后台 - 金额表示
// ==========================================
// 内存中使用 rust_decimal::Decimal；落库为最小货币单位（分）的 INTEGER
// 余额累加在整数上进行，与入账顺序无关
// ==========================================

use rust_decimal::Decimal;

/// 金额小数位（分）
pub const MONEY_SCALE: u32 = 2;

/// 小数位是否在允许范围内（"100.50" 合法，"0.005" 不合法）
pub fn has_money_scale(amount: Decimal) -> bool {
    amount.normalize().scale() <= MONEY_SCALE
}

/// 金额 → 最小货币单位；小数位超限或溢出返回 None
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    let normalized = amount.normalize();
    if normalized.scale() > MONEY_SCALE {
        return None;
    }
    let factor = 10i128.checked_pow(MONEY_SCALE - normalized.scale())?;
    let minor = normalized.mantissa().checked_mul(factor)?;
    i64::try_from(minor).ok()
}

/// 最小货币单位 → 金额（固定两位小数）
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, MONEY_SCALE)
}
