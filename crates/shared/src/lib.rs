use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Запрос на построение модели (`POST /create_model`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    /// Фрагмент кода модели. Передаётся движку как есть, без проверки семантики
    pub model_code: String,
}

/// Тело ответа при ошибке построения
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Краткое описание ошибки
    pub error: String,
    /// Подсказка для клиента
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Полный вывод движка (stdout + stderr)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    /// Как завершился процесс движка
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            log: None,
            exit: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = Some(log.into());
        self
    }

    pub fn with_exit(mut self, exit: impl Into<String>) -> Self {
        self.exit = Some(exit.into());
        self
    }
}

/// Формат выходного файла модели
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Glb,
    Stl,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 2] = [OutputFormat::Glb, OutputFormat::Stl];

    /// Расширение файла без точки
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Glb => "glb",
            OutputFormat::Stl => "stl",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Glb => "application/octet-stream",
            OutputFormat::Stl => "model/stl",
        }
    }

    /// Заголовок `Content-Disposition`: вложение с именем `model.<расширение>`
    pub fn content_disposition(self) -> &'static str {
        match self {
            OutputFormat::Glb => "attachment; filename=model.glb",
            OutputFormat::Stl => "attachment; filename=model.stl",
        }
    }

    /// Имя шаблона скрипта для этого формата
    pub fn template_name(self) -> &'static str {
        match self {
            OutputFormat::Glb => "main.py.tmpl",
            OutputFormat::Stl => "main_stl.py.tmpl",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_start_matches('.');
        OutputFormat::ALL
            .into_iter()
            .find(|format| format.extension().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown output format '{}'", s))
    }
}
