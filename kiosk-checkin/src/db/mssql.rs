//! SQL Server backend (TDS via tiberius)
//!
//! `sqlServer` accepts `host`, `host,port` or `host\instance`. Named instances
//! are resolved through the SQL Browser service.

use chrono::NaiveDateTime;
use kiosk_common::DatabaseDescriptor;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Row, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, warn};

use super::{AppointmentRecord, ArrivalMark, BOOKED_STATUS};
use crate::error::{Error, Result};

type TdsClient = Client<Compat<TcpStream>>;

const FIND_APPOINTMENTS_SQL: &str = "\
SELECT DisplayedName, Start, PatientHasArrived
FROM BokanirDagsins
WHERE DisplayedPersonalNo = @P1";

const MARK_ARRIVED_SQL: &str = "\
UPDATE bo
SET bo.PatientHasArrived = @P1
FROM BookingObject bo
INNER JOIN MainActor ma ON bo.Actor_ID = ma.ActorID
WHERE ma.DisplayedPersonalNo = @P2
  AND bo.Start >= @P3
  AND bo.Start <= @P4
  AND bo.Status = @P5
  AND (bo.PatientHasArrived IS NULL OR bo.PatientHasArrived = '')";

/// Parsed `sqlServer` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: Option<u16>,
    pub instance: Option<String>,
}

impl ServerAddress {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let invalid = || {
            Error::Common(kiosk_common::Error::Config(format!(
                "invalid SQL Server address '{}'",
                raw
            )))
        };

        if let Some((host, instance)) = raw.split_once('\\') {
            if host.is_empty() || instance.is_empty() {
                return Err(invalid());
            }
            return Ok(Self {
                host: host.to_string(),
                port: None,
                instance: Some(instance.to_string()),
            });
        }

        if let Some((host, port)) = raw.split_once(',') {
            let port = port.trim().parse::<u16>().map_err(|_| invalid())?;
            if host.is_empty() {
                return Err(invalid());
            }
            return Ok(Self {
                host: host.to_string(),
                port: Some(port),
                instance: None,
            });
        }

        if raw.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            host: raw.to_string(),
            port: None,
            instance: None,
        })
    }
}

fn client_config(db: &DatabaseDescriptor, address: &ServerAddress) -> Config {
    let mut config = Config::new();
    config.host(&address.host);
    if let Some(port) = address.port {
        config.port(port);
    }
    if let Some(instance) = &address.instance {
        config.instance_name(instance);
    }
    config.database(&db.sql_database);
    config.authentication(AuthMethod::sql_server(&db.sql_user, &db.sql_password));
    config.encryption(if db.options.encrypt {
        EncryptionLevel::Required
    } else {
        EncryptionLevel::Off
    });
    if db.trusts_server_certificate() {
        config.trust_cert();
    }
    config.application_name("clinic-kiosk");
    config
}

async fn connect(db: &DatabaseDescriptor) -> Result<TdsClient> {
    let address = ServerAddress::parse(&db.sql_server)?;
    let config = client_config(db, &address);

    let tcp = if address.instance.is_some() {
        TcpStream::connect_named(&config).await?
    } else {
        TcpStream::connect(config.get_addr()).await?
    };
    tcp.set_nodelay(true)?;

    let mut client = Client::connect(config, tcp.compat_write()).await?;

    if db.options.enable_arith_abort {
        client.simple_query("SET ARITHABORT ON").await?.into_results().await?;
    }

    debug!(database = %db.name, server = %db.sql_server, "Connected to SQL Server");
    Ok(client)
}

async fn close(db: &DatabaseDescriptor, client: TdsClient) {
    if let Err(e) = client.close().await {
        warn!(database = %db.name, error = %e, "Error closing SQL Server connection");
    }
}

fn read_record(row: &Row) -> Result<AppointmentRecord> {
    let display_name = row
        .try_get::<&str, _>("DisplayedName")?
        .unwrap_or_default()
        .to_string();
    let start = row.try_get::<NaiveDateTime, _>("Start")?;

    // The marker column is text on most installations; accept datetime too.
    let arrived_at = match row.try_get::<&str, _>("PatientHasArrived") {
        Ok(value) => value.map(str::to_string),
        Err(_) => row
            .try_get::<NaiveDateTime, _>("PatientHasArrived")?
            .map(|t| t.format(super::TIMESTAMP_FORMAT).to_string()),
    };

    Ok(AppointmentRecord {
        display_name,
        start,
        arrived_at,
    })
}

pub async fn find_appointments(
    db: &DatabaseDescriptor,
    identifier: &str,
) -> Result<Vec<AppointmentRecord>> {
    let mut client = connect(db).await?;

    let result = async {
        let rows = client
            .query(FIND_APPOINTMENTS_SQL, &[&identifier])
            .await?
            .into_first_result()
            .await?;
        rows.iter().map(read_record).collect::<Result<Vec<_>>>()
    }
    .await;

    close(db, client).await;
    result
}

pub async fn mark_arrived(
    db: &DatabaseDescriptor,
    identifier: &str,
    mark: &ArrivalMark,
) -> Result<u64> {
    let mut client = connect(db).await?;
    let arrived_at = mark.at_text();

    let result = async {
        let outcome = client
            .execute(
                MARK_ARRIVED_SQL,
                &[
                    &arrived_at,
                    &identifier,
                    &mark.window_start,
                    &mark.window_end,
                    &BOOKED_STATUS,
                ],
            )
            .await?;
        Ok::<_, Error>(outcome.total())
    }
    .await;

    close(db, client).await;
    result
}

pub async fn test_connection(db: &DatabaseDescriptor) -> Result<()> {
    let mut client = connect(db).await?;

    let result = async {
        client.simple_query("SELECT 1").await?.into_results().await?;
        Ok::<_, Error>(())
    }
    .await;

    close(db, client).await;
    result
}
