// 東証の売買単位
pub const LOT_SIZE: u64 = 100;

// 予算を単元株(100株)単位に切り捨てた株数
pub fn round_lot(budget: f64, price: f64) -> u64 {
    if price <= 0.0 || !budget.is_finite() || budget <= 0.0 {
        return 0;
    }
    let lots = (budget / price / LOT_SIZE as f64).floor();
    lots as u64 * LOT_SIZE
}

// 資金の一定割合で株数を決める。最低単元に届かなければ0
pub fn position_qty(capital: f64, risk_per_trade: f64, price: f64) -> u64 {
    let qty = round_lot(capital * risk_per_trade, price);
    if qty >= LOT_SIZE {
        qty
    } else {
        0
    }
}

pub fn pnl_ratio(entry_price: f64, current_price: f64) -> f64 {
    (current_price - entry_price) / entry_price
}
