//! Cron scheduling of the script on the instance

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use super::{StackError, validate_shell_input};
use crate::defaults::CRON_EVERY_MINUTE;

/// Package providing the cron daemon on Amazon Linux 2023
pub const SCHEDULER_PACKAGE: &str = "cronie";

/// systemd unit of the cron daemon
pub const SCHEDULER_SERVICE: &str = "crond";

/// A five-field cron expression (minute hour day-of-month month day-of-week)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CronSchedule(String);

impl CronSchedule {
    pub fn every_minute() -> Self {
        Self(CRON_EVERY_MINUTE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CronSchedule {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| StackError::InvalidSchedule {
            value: s.to_string(),
            reason,
        };
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid(format!("expected 5 fields, found {}", fields.len())));
        }
        for field in &fields {
            if let Some(c) = field
                .chars()
                .find(|&c| !(c.is_ascii_alphanumeric() || matches!(c, '*' | '/' | ',' | '-')))
            {
                return Err(invalid(format!("unexpected character {c:?} in '{field}'")));
            }
        }
        // Normalize spacing so equal schedules compare equal
        Ok(Self(fields.join(" ")))
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for CronSchedule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// A crontab entry running a script with an interpreter, appending output to a log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJob {
    pub schedule: CronSchedule,
    pub interpreter: String,
    pub script: String,
    pub log: String,
}

impl CronJob {
    pub fn new(
        schedule: CronSchedule,
        interpreter: impl Into<String>,
        script: impl Into<String>,
        log: impl Into<String>,
    ) -> Result<Self, StackError> {
        let job = Self {
            schedule,
            interpreter: interpreter.into(),
            script: script.into(),
            log: log.into(),
        };
        validate_shell_input(&job.interpreter, "interpreter")?;
        validate_shell_input(&job.script, "script destination")?;
        validate_shell_input(&job.log, "log path")?;
        Ok(job)
    }

    /// The crontab line, e.g. `* * * * * python3 /x.py >> /x.log 2>&1`
    pub fn line(&self) -> String {
        format!(
            "{} {} {} >> {} 2>&1",
            self.schedule, self.interpreter, self.script, self.log
        )
    }

    /// Commands that install and start cron, then append [`line`](Self::line)
    /// to the current user's crontab without dropping existing entries.
    pub fn install_commands(&self) -> Vec<String> {
        vec![
            "sudo dnf -y update".to_string(),
            format!("sudo dnf -y install {SCHEDULER_PACKAGE}"),
            format!("sudo systemctl enable {SCHEDULER_SERVICE}"),
            format!("sudo systemctl start {SCHEDULER_SERVICE}"),
            "crontab -l > tmpfile".to_string(),
            format!("echo \"{}\" >> tmpfile", self.line()),
            "crontab tmpfile".to_string(),
            "rm tmpfile".to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> CronJob {
        CronJob::new(
            CronSchedule::every_minute(),
            "python3",
            "/home/ec2-user/simple.py",
            "/home/ec2-user/output.log",
        )
        .unwrap()
    }

    #[test]
    fn test_line() {
        assert_eq!(
            job().line(),
            "* * * * * python3 /home/ec2-user/simple.py >> /home/ec2-user/output.log 2>&1"
        );
    }

    #[test]
    fn test_install_commands() {
        let commands = job().install_commands();
        assert_eq!(
            commands,
            vec![
                "sudo dnf -y update",
                "sudo dnf -y install cronie",
                "sudo systemctl enable crond",
                "sudo systemctl start crond",
                "crontab -l > tmpfile",
                "echo \"* * * * * python3 /home/ec2-user/simple.py >> /home/ec2-user/output.log 2>&1\" >> tmpfile",
                "crontab tmpfile",
                "rm tmpfile",
            ]
        );
    }

    #[test]
    fn test_schedule_parse() {
        let schedule: CronSchedule = "*/5  0 * * mon-fri".parse().unwrap();
        assert_eq!(schedule.as_str(), "*/5 0 * * mon-fri");
        assert_eq!("* * * * *".parse::<CronSchedule>().unwrap(), CronSchedule::every_minute());
    }

    #[test]
    fn test_schedule_rejects_bad_input() {
        for bad in ["", "* * * *", "* * * * * *", "* * * * $(reboot)", "@reboot"] {
            assert!(
                matches!(bad.parse::<CronSchedule>(), Err(StackError::InvalidSchedule { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_job_rejects_unsafe_paths() {
        let err = CronJob::new(
            CronSchedule::every_minute(),
            "python3",
            "/home/ec2-user/$(whoami).py",
            "/tmp/out.log",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StackError::UnsafeShellInput {
                field: "script destination",
                found: '$'
            }
        ));
    }
}
