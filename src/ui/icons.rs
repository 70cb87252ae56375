pub struct Icons;

impl Icons {
    pub const CHART: &str = "📈";
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const DATABASE: &str = "🗄️";
    pub const MONEY: &str = "💰";
    pub const CALENDAR: &str = "📅";
    pub const LEDGER: &str = "🧾";
    pub const DEL: &str = "🗑️";
    pub const SAVE: &str = "💾";
    pub const UP: &str = "🔺";
    pub const DOWN: &str = "🔻";
}
