diesel::table! {
    measurements (id) {
        id -> Integer,
        meas_time -> BigInt,
        sensor -> Text,
        temperature -> Float,
        humidity -> Float,
    }
}

pub const CREATE_MEASUREMENTS: &str = "CREATE TABLE IF NOT EXISTS measurements (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    meas_time BIGINT NOT NULL,
    sensor TEXT NOT NULL,
    temperature FLOAT NOT NULL,
    humidity FLOAT NOT NULL
)";
