use anyhow::Result;
use chrono::prelude::*;
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::BigInt;
use diesel::sqlite::Sqlite;
use diesel::{prelude::*, AsExpression, FromSqlRow};

use std::ops::Deref;

use crate::station;

pub mod schema;

#[derive(Debug, Queryable)]
#[allow(dead_code)]
pub struct JournalEntry {
    pub id: i32,
    pub meas_time: DateTimeUtc,
    pub sensor: String,
    pub temperature: f32,
    pub humidity: f32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = schema::measurements)]
pub struct InsertableMeasurement<'a> {
    meas_time: DateTimeUtc,
    sensor: &'a str,
    temperature: f32,
    humidity: f32,
}

impl<'a> InsertableMeasurement<'a> {
    fn new(sensor: &'a str, measurement: &station::Measurement) -> Self {
        Self {
            meas_time: DateTimeUtc(measurement.timestamp),
            sensor,
            temperature: measurement.temperature.0,
            humidity: measurement.humidity.0,
        }
    }
}

/// Append-only history of successful readings in SQLite.
pub struct Journal {
    conn: SqliteConnection,
}

impl Journal {
    pub fn open(db_path: &str) -> Result<Journal> {
        let mut conn = SqliteConnection::establish(db_path)?;
        diesel::sql_query(schema::CREATE_MEASUREMENTS).execute(&mut conn)?;

        log::debug!("Journal {db_path} ready.");
        Ok(Journal { conn })
    }

    pub fn record(&mut self, sensor: &str, measurement: &station::Measurement) -> Result<()> {
        let insertable = InsertableMeasurement::new(sensor, measurement);
        diesel::insert_into(schema::measurements::table)
            .values(insertable)
            .execute(&mut self.conn)?;

        Ok(())
    }

    pub fn count(&mut self) -> Result<i64> {
        use schema::measurements::dsl::*;

        Ok(measurements.count().get_result(&mut self.conn)?)
    }

    /// Newest entries first.
    pub fn recent(&mut self, limit: i64) -> Result<Vec<JournalEntry>> {
        use schema::measurements::dsl::*;

        Ok(measurements
            .order(id.desc())
            .limit(limit)
            .load::<JournalEntry>(&mut self.conn)?)
    }

    #[cfg(test)]
    pub fn drop_table(&mut self) -> Result<()> {
        diesel::sql_query("DROP TABLE measurements").execute(&mut self.conn)?;
        Ok(())
    }
}

/// UTC timestamp stored as microseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, AsExpression, FromSqlRow)]
#[diesel(sql_type = BigInt)]
pub struct DateTimeUtc(DateTime<Utc>);

impl Deref for DateTimeUtc {
    type Target = DateTime<Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromSql<BigInt, Sqlite> for DateTimeUtc {
    fn from_sql(value: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let raw_val = <i64 as FromSql<BigInt, Sqlite>>::from_sql(value)?;

        let time =
            from_micros(raw_val).ok_or_else(|| format!("Timestamp {raw_val} out of range"))?;

        Ok(DateTimeUtc(time))
    }
}

impl ToSql<BigInt, Sqlite> for DateTimeUtc {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.0.timestamp_micros());

        Ok(IsNull::No)
    }
}

fn from_micros(micros: i64) -> Option<DateTime<Utc>> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::{Humidity, Measurement, Temperature};

    fn measurement_at(t: f32, h: f32, micros: i64) -> Measurement {
        let timestamp = from_micros(micros).unwrap();
        Measurement::at(Temperature(t), Humidity(h), timestamp).unwrap()
    }

    #[test]
    fn new_journal_is_empty() {
        let mut journal = Journal::open(":memory:").unwrap();

        assert_eq!(journal.count().unwrap(), 0);
        assert!(journal.recent(1).unwrap().is_empty());
    }

    #[test]
    fn records_are_read_back_newest_first() {
        let mut journal = Journal::open(":memory:").unwrap();

        journal
            .record("AHT20", &measurement_at(21.5, 47.3, 1_760_000_000_000_001))
            .unwrap();
        journal
            .record("HTS221", &measurement_at(21.9, 45.0, 1_760_000_005_000_002))
            .unwrap();

        assert_eq!(journal.count().unwrap(), 2);
        let entries = journal.recent(10).unwrap();
        assert_eq!(entries[0].sensor, "HTS221");
        assert_eq!(entries[0].temperature, 21.9);
        assert_eq!(entries[1].sensor, "AHT20");
        assert_eq!(entries[1].humidity, 47.3);
        assert_eq!(entries[1].meas_time.timestamp_micros(), 1_760_000_000_000_001);
    }

    #[test]
    fn record_keeps_the_sensor_name() {
        let mut journal = Journal::open(":memory:").unwrap();
        let sensor = String::from("AHT20");

        journal
            .record(&sensor, &measurement_at(21.5, 47.3, 1_000_000))
            .unwrap();

        assert_eq!(journal.recent(1).unwrap()[0].sensor, sensor);
    }

    #[test]
    fn record_fails_without_the_table() {
        let mut journal = Journal::open(":memory:").unwrap();
        journal.drop_table().unwrap();

        assert!(journal
            .record("AHT20", &measurement_at(21.5, 47.3, 1_000_000))
            .is_err());
    }

    #[test]
    fn recent_respects_the_limit() {
        let mut journal = Journal::open(":memory:").unwrap();
        for i in 0..3 {
            journal
                .record("AHT20", &measurement_at(20.0, 40.0 + i as f32, i))
                .unwrap();
        }

        let entries = journal.recent(1).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].humidity, 42.0);
    }
}
