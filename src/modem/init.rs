// ABOUTME: Modem initialisation sequence run by GsmModem::connect
// ABOUTME: Resets the modem, unlocks the SIM, probes capabilities and enables notifications

use super::{Capabilities, GsmModem};
use crate::error::{CmeError, ErrorDomain, GsmError, GsmResult};
use crate::frame::Line;
use crate::modem::call::{CallStatusDialect, DtmfCommand};
use crate::modem::command::CommandRequest;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Some modems never finish `AT+CPIN?` with OK
const CPIN_TIMEOUT: Duration = Duration::from_millis(500);
/// `AT+WIND` mask enabling call status indications
const WIND_CALL_EVENTS: u32 = 50;
/// Preferred storages for reading, writing and status reports
const PREFERRED_STORAGE: [&str; 3] = ["SM", "SM", "SR"];

/// Treats a command error as a missing feature, anything else as fatal
fn tolerate<T>(command: &str, result: GsmResult<T>) -> GsmResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e @ GsmError::Command { .. }) => {
            warn!(command, error = %e, "Command not supported, continuing");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

impl GsmModem {
    /// Brings the modem into the state the rest of this crate relies on:
    /// echo off, verbose errors, SIM unlocked, SMS and call notifications
    /// enabled.
    pub async fn init(&self) -> GsmResult<()> {
        info!("Initialising modem");
        let commands = &self.inner.commands;
        let config = &self.inner.config;

        commands.write("ATZ").await?;
        commands.write("ATE0").await?;
        self.enable_functionality().await?;
        commands.write("AT+CMEE=1").await?;
        self.unlock_sim().await?;

        let supported = self.supported_commands().await?;
        let dtmf = match &supported {
            Some(list) if list.iter().any(|c| c == "+VTS") => Some(DtmfCommand::Vts),
            Some(list) if list.iter().any(|c| c == "^DTMF") => Some(DtmfCommand::Huawei),
            Some(_) => None,
            None => Some(DtmfCommand::Vts),
        };
        if supported.iter().flatten().any(|c| c == "^CVOICE") {
            // Route call audio to the serial interface
            tolerate("AT^CVOICE=0", commands.write("AT^CVOICE=0").await)?;
        }
        let dialect = match config.call_dialect {
            Some(dialect) => dialect,
            None => self.probe_call_dialect().await?,
        };
        if dialect == CallStatusDialect::Generic {
            // Connected line identification is the only sign of a remote answer
            tolerate("AT+COLP=1", commands.write("AT+COLP=1").await)?;
        }

        // Operator name in long alphanumeric format
        commands.write_unparsed("AT+COPS=3,0").await?;
        self.set_sms_text_mode(config.sms_text_mode).await?;
        if config.sms_text_mode {
            commands.write("AT+CSMP=49,167,0,0").await?;
        }
        if let Some(smsc) = &config.smsc {
            self.set_smsc(smsc).await?;
        }
        self.select_storage().await?;
        tolerate("AT+CNMI=2,1,0,2", commands.write("AT+CNMI=2,1,0,2").await)?;

        let caller_id = tolerate("AT+CLIP=1", commands.write("AT+CLIP=1").await)?.is_some();
        let extended_ring =
            caller_id && tolerate("AT+CRC=1", commands.write("AT+CRC=1").await)?.is_some();
        self.set_capabilities(Capabilities {
            dialect,
            dtmf,
            caller_id,
            extended_ring,
        });
        // Hang up with ATH regardless of the data/voice state
        commands.write_unparsed("AT+CVHU=0").await?;

        info!(?dialect, ?dtmf, caller_id, extended_ring, "Modem initialised");
        Ok(())
    }

    async fn enable_functionality(&self) -> GsmResult<()> {
        let commands = &self.inner.commands;
        let Some(lines) = tolerate("AT+CFUN?", commands.write("AT+CFUN?").await)? else {
            return Ok(());
        };
        let mode = lines
            .iter()
            .find_map(|line| line.as_str().strip_prefix("+CFUN:"))
            .and_then(|value| value.split(',').next())
            .and_then(|value| value.trim().parse::<u8>().ok());
        if mode != Some(1) {
            debug!(?mode, "Enabling full functionality");
            tolerate("AT+CFUN=1", commands.write("AT+CFUN=1").await)?;
        }
        Ok(())
    }

    async fn unlock_sim(&self) -> GsmResult<()> {
        let request = CommandRequest::new("AT+CPIN?").with_timeout(CPIN_TIMEOUT);
        let lines = match self.inner.commands.execute(request).await {
            Ok(lines) => lines,
            Err(GsmError::Timeout { partial }) if !partial.is_empty() => partial,
            Err(e) => return Err(e),
        };
        let state = lines
            .iter()
            .find_map(|line| line.as_str().strip_prefix("+CPIN:"))
            .map(str::trim)
            .ok_or_else(|| GsmError::unexpected("AT+CPIN?", &lines))?;

        match state {
            "READY" => Ok(()),
            "SIM PIN" => match &self.inner.config.pin {
                Some(pin) => {
                    self.inner
                        .commands
                        .write(&format!("AT+CPIN=\"{pin}\""))
                        .await?;
                    info!("SIM PIN accepted");
                    Ok(())
                }
                None => Err(sim_locked(CmeError::SimPinRequired)),
            },
            "SIM PUK" => Err(sim_locked(CmeError::SimPukRequired)),
            other => Err(GsmError::InvalidState(format!("SIM not ready: {other}"))),
        }
    }

    /// Wavecom modems answer `AT+WIND?`; Huawei ones reject it
    async fn probe_call_dialect(&self) -> GsmResult<CallStatusDialect> {
        let commands = &self.inner.commands;
        match commands.write("AT+WIND?").await {
            Ok(lines) => {
                let current = lines
                    .iter()
                    .find_map(|line| line.as_str().strip_prefix("+WIND:"))
                    .and_then(|value| value.trim().parse::<u32>().ok());
                if current != Some(WIND_CALL_EVENTS) {
                    commands
                        .write(&format!("AT+WIND={WIND_CALL_EVENTS}"))
                        .await?;
                }
                Ok(CallStatusDialect::Wavecom)
            }
            Err(GsmError::Command { .. }) => Ok(CallStatusDialect::Huawei),
            Err(e) => Err(e),
        }
    }

    async fn select_storage(&self) -> GsmResult<()> {
        let commands = &self.inner.commands;
        let Some(lines) = tolerate("AT+CPMS=?", commands.write("AT+CPMS=?").await)? else {
            return Ok(());
        };
        let Some(supported) = parse_storage_support(&lines) else {
            warn!("Could not parse supported message storages");
            return Ok(());
        };

        let mut selection: Vec<String> = PREFERRED_STORAGE
            .iter()
            .zip(supported.iter())
            .map(|(wanted, available)| {
                if available.iter().any(|name| name == wanted) {
                    format!("\"{wanted}\"")
                } else {
                    String::new()
                }
            })
            .collect();
        while selection.last().is_some_and(String::is_empty) {
            selection.pop();
        }
        if selection.is_empty() {
            return Ok(());
        }
        let command = format!("AT+CPMS={}", selection.join(","));
        tolerate(&command, commands.write(&command).await)?;
        Ok(())
    }
}

fn sim_locked(error: CmeError) -> GsmError {
    GsmError::Command {
        command: "AT+CPIN?".to_string(),
        domain: ErrorDomain::Cme,
        code: Some(error as u16),
    }
}

/// Storage names per `AT+CPMS` parameter, from
/// `+CPMS: ("SM","ME"),("SM","ME"),("SM","SR")`
fn parse_storage_support(lines: &[Line]) -> Option<Vec<Vec<String>>> {
    let groups = lines
        .iter()
        .find_map(|line| line.as_str().strip_prefix("+CPMS:"))?
        .trim();
    let groups: Vec<Vec<String>> = groups
        .split("),(")
        .map(|group| {
            group
                .split(',')
                .map(|name| name.trim_matches(['(', ')', '"', ' ']).to_string())
                .filter(|name| !name.is_empty())
                .collect()
        })
        .collect();
    (!groups.is_empty()).then_some(groups)
}
