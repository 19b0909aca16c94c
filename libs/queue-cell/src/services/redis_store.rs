use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{Appointment, AppointmentStore, PartitionKey, QueueDate, QueueError};

const DEFAULT_PREFIX: &str = "queue";

// Returns -1 when the record is gone, 0 on a version mismatch, 1 when written.
const CAS_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'version')
if not current then
    return -1
end
if tonumber(current) ~= tonumber(ARGV[1]) then
    return 0
end
redis.call('HSET', KEYS[1], 'data', ARGV[2], 'version', ARGV[3])
return 1
"#;

/// Redis-backed store shared by every API instance.
///
/// Layout:
/// - `{prefix}:seq:{doctor}:{hospital}:{date}` token counter (`INCR`)
/// - `{prefix}:appointment:{id}` hash with `data` (JSON) and `version`
/// - `{prefix}:doctor:{id}:{date}` and `{prefix}:hospital:{id}:{date}` sorted sets scored by token number
/// - `{prefix}:patient:{id}` set of appointment ids
pub struct RedisAppointmentStore {
    pool: Pool,
    prefix: String,
    cas: redis::Script,
}

impl RedisAppointmentStore {
    pub async fn new(redis_url: &str) -> Result<Self, QueueError> {
        Self::with_prefix(redis_url, DEFAULT_PREFIX).await
    }

    pub async fn with_prefix(redis_url: &str, prefix: &str) -> Result<Self, QueueError> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| QueueError::Storage(format!("Failed to create Redis pool: {}", e)))?;

        let store = Self {
            pool,
            prefix: prefix.to_string(),
            cas: redis::Script::new(CAS_SCRIPT),
        };

        let mut conn = store.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis appointment store connected (prefix {})", store.prefix);

        Ok(store)
    }

    async fn connection(&self) -> Result<Connection, QueueError> {
        self.pool
            .get()
            .await
            .map_err(|e| QueueError::Storage(format!("Failed to get Redis connection: {}", e)))
    }

    fn sequence_key(&self, partition: &PartitionKey) -> String {
        format!("{}:seq:{}", self.prefix, partition)
    }

    fn appointment_key(&self, id: Uuid) -> String {
        format!("{}:appointment:{}", self.prefix, id)
    }

    fn doctor_key(&self, doctor_id: Uuid, date: QueueDate) -> String {
        format!("{}:doctor:{}:{}", self.prefix, doctor_id, date)
    }

    fn hospital_key(&self, hospital_id: Uuid, date: QueueDate) -> String {
        format!("{}:hospital:{}:{}", self.prefix, hospital_id, date)
    }

    fn patient_key(&self, patient_id: Uuid) -> String {
        format!("{}:patient:{}", self.prefix, patient_id)
    }

    async fn load_many(&self, conn: &mut Connection, ids: Vec<String>) -> Result<Vec<Appointment>, QueueError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hget(format!("{}:appointment:{}", self.prefix, id), "data");
        }
        let rows: Vec<Option<String>> = pipe.query_async(conn).await?;

        let mut appointments = Vec::with_capacity(rows.len());
        for (id, row) in ids.iter().zip(rows) {
            match row {
                Some(data) => appointments.push(serde_json::from_str::<Appointment>(&data)?),
                None => warn!("Index references missing appointment {}", id),
            }
        }
        appointments.sort_by(Appointment::queue_order);
        Ok(appointments)
    }
}

#[async_trait]
impl AppointmentStore for RedisAppointmentStore {
    async fn next_token_number(&self, partition: &PartitionKey) -> Result<u32, QueueError> {
        let mut conn = self.connection().await?;
        let next: u64 = conn.incr(self.sequence_key(partition), 1).await?;
        u32::try_from(next)
            .map_err(|_| QueueError::Storage(format!("Token sequence exhausted for {}", partition)))
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, QueueError> {
        let mut conn = self.connection().await?;
        let key = self.appointment_key(appointment.id);

        let created: bool = conn.hset_nx(&key, "version", appointment.version).await?;
        if !created {
            return Err(QueueError::Storage(format!("Appointment {} already exists", appointment.id)));
        }

        let data = serde_json::to_string(&appointment)?;
        let id = appointment.id.to_string();
        let score = f64::from(appointment.token.number);

        let _: () = redis::pipe()
            .atomic()
            .hset(&key, "data", data)
            .ignore()
            .zadd(self.doctor_key(appointment.doctor_id, appointment.queue_date), &id, score)
            .ignore()
            .zadd(self.hospital_key(appointment.hospital_id, appointment.queue_date), &id, score)
            .ignore()
            .sadd(self.patient_key(appointment.patient_id), &id)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!("Stored appointment {} as {}", appointment.id, key);
        Ok(appointment)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, QueueError> {
        let mut conn = self.connection().await?;
        let data: Option<String> = conn.hget(self.appointment_key(id), "data").await?;
        data.map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(QueueError::from)
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        mut appointment: Appointment,
    ) -> Result<Appointment, QueueError> {
        appointment.version = expected_version + 1;
        let data = serde_json::to_string(&appointment)?;

        let mut conn = self.connection().await?;
        let outcome: i64 = self
            .cas
            .key(self.appointment_key(appointment.id))
            .arg(expected_version)
            .arg(data)
            .arg(appointment.version)
            .invoke_async(&mut conn)
            .await?;

        match outcome {
            1 => Ok(appointment),
            0 => Err(QueueError::ConcurrencyConflict(appointment.id.to_string())),
            _ => Err(QueueError::NotFound(format!("Appointment {} not found", appointment.id))),
        }
    }

    async fn list_by_doctor(&self, doctor_id: Uuid, date: QueueDate) -> Result<Vec<Appointment>, QueueError> {
        let mut conn = self.connection().await?;
        let ids: Vec<String> = conn.zrange(self.doctor_key(doctor_id, date), 0, -1).await?;
        self.load_many(&mut conn, ids).await
    }

    async fn list_by_hospital(&self, hospital_id: Uuid, date: QueueDate) -> Result<Vec<Appointment>, QueueError> {
        let mut conn = self.connection().await?;
        let ids: Vec<String> = conn.zrange(self.hospital_key(hospital_id, date), 0, -1).await?;
        self.load_many(&mut conn, ids).await
    }

    async fn list_by_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, QueueError> {
        let mut conn = self.connection().await?;
        let ids: Vec<String> = conn.smembers(self.patient_key(patient_id)).await?;
        self.load_many(&mut conn, ids).await
    }
}
