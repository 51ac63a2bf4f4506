//! HTML rendering for report and reconnection emails.

use std::sync::Arc;

use handlebars::{Handlebars, RenderError, TemplateError};
use serde::Serialize;

use crate::models::integration_token::Provider;
use crate::models::mood::MoodType;
use crate::models::profile::Profile;
use crate::models::report::ReportKind;
use crate::services::report::{ReportData, Section};

const REPORT_TEMPLATE: &str = "report";
const RECONNECTION_TEMPLATE: &str = "reconnection";

#[derive(Serialize)]
struct SectionView {
    title: &'static str,
    lines: Vec<String>,
    unavailable: Option<String>,
}

impl SectionView {
    fn build<T>(title: &'static str, section: &Section<T>, lines: impl FnOnce(&T) -> Vec<String>) -> Self {
        match section {
            Section::Ok(value) => Self {
                title,
                lines: lines(value),
                unavailable: None,
            },
            Section::Unavailable { reason } => Self {
                title,
                lines: vec![],
                unavailable: Some(reason.clone()),
            },
        }
    }
}

#[derive(Serialize)]
struct ReportView<'a> {
    title: String,
    name: &'a str,
    kind_label: String,
    period_label: String,
    score: i32,
    sections: Vec<SectionView>,
    has_integrations: bool,
    settings_url: String,
}

#[derive(Serialize)]
struct ReconnectionView<'a> {
    name: &'a str,
    provider_name: &'a str,
    reconnect_url: String,
    error: Option<&'a str>,
}

fn provider_sections(data: &ReportData) -> Vec<SectionView> {
    let mut sections = Vec::new();
    if let Some(section) = &data.fitness {
        sections.push(SectionView::build("Activity & sleep", section, |f| {
            let mut lines = vec![
                format!("{} steps in total", f.total_steps),
                format!("{} steps per day on average", f.avg_daily_steps),
            ];
            if let Some(asleep) = f.avg_minutes_asleep {
                lines.push(format!("{}h {:02}m asleep per night", asleep / 60, asleep % 60));
            }
            lines
        }));
    }
    if let Some(section) = &data.calendar {
        sections.push(SectionView::build("Calendar", section, |c| {
            let mut lines = vec![format!(
                "{} events, {}h {:02}m scheduled",
                c.event_count,
                c.busy_minutes / 60,
                c.busy_minutes % 60
            )];
            lines.extend(c.first_events.iter().cloned());
            lines
        }));
    }
    if let Some(section) = &data.tasks {
        sections.push(SectionView::build("Tasks", section, |t| {
            vec![
                format!("{} completed", t.completed_in_period),
                format!("{} open, {} overdue", t.open, t.overdue),
            ]
        }));
    }
    if let Some(section) = &data.email {
        sections.push(SectionView::build("Email", section, |e| {
            vec![
                format!("{} unread in your inbox", e.unread_inbox),
                format!("{} messages received", e.received_in_period),
            ]
        }));
    }
    if let Some(section) = &data.music {
        sections.push(SectionView::build("Music", section, |m| {
            let mut lines = vec![format!(
                "{} tracks, {} minutes listened",
                m.tracks_played, m.minutes_listened
            )];
            if let Some(artist) = &m.top_artist {
                lines.push(format!("Most played: {}", artist));
            }
            lines
        }));
    }
    sections
}

pub fn report_subject(kind: ReportKind, data: &ReportData) -> String {
    format!(
        "Your {} Wellboard report: {} ({})",
        kind.label().to_lowercase(),
        data.score,
        period_label(data)
    )
}

fn period_label(data: &ReportData) -> String {
    let fmt = "%b %-d, %Y";
    if data.period.start == data.period.end {
        data.period.end.format(fmt).to_string()
    } else {
        format!("{} - {}", data.period.start.format("%b %-d"), data.period.end.format(fmt))
    }
}

#[derive(Clone)]
pub struct Renderer {
    hb: Arc<Handlebars<'static>>,
    frontend_url: String,
}

impl Renderer {
    pub fn new(frontend_url: impl Into<String>) -> Result<Self, TemplateError> {
        let mut hb = Handlebars::new();
        hb.register_template_string(REPORT_TEMPLATE, include_str!("../../templates/report.hbs"))?;
        hb.register_template_string(
            RECONNECTION_TEMPLATE,
            include_str!("../../templates/reconnection.hbs"),
        )?;
        Ok(Self {
            hb: Arc::new(hb),
            frontend_url: frontend_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn settings_url(&self) -> String {
        format!("{}/settings/integrations", self.frontend_url)
    }

    pub fn reconnect_url(&self, provider: Provider) -> String {
        format!("{}?reconnect={}", self.settings_url(), provider.slug())
    }

    pub fn render_report(&self, profile: &Profile, data: &ReportData) -> Result<String, RenderError> {
        let mut sections = provider_sections(data);
        let has_integrations = !sections.is_empty();

        sections.push(SectionView::build("Weather", &data.weather, |w| {
            vec![format!("{}: {}, {:.0}°C", w.city, w.description, w.temp_c)]
        }));
        sections.push(SectionView::build("Mood", &data.mood, |m| {
            let mut lines = vec![match m.confidence_score {
                Some(c) if m.mood_type == MoodType::Predicted => {
                    format!("{} (predicted, {:.0}% confidence)", m.mood.label(), c * 100.0)
                }
                _ => m.mood.label().to_string(),
            }];
            lines.extend(m.factors.iter().cloned());
            lines
        }));

        let view = ReportView {
            title: report_subject(data.kind, data),
            name: &profile.name,
            kind_label: data.kind.label().to_lowercase(),
            period_label: period_label(data),
            score: data.score,
            sections,
            has_integrations,
            settings_url: self.settings_url(),
        };
        self.hb.render(REPORT_TEMPLATE, &view)
    }

    pub fn render_reconnection(
        &self,
        name: &str,
        provider: Provider,
        error: Option<&str>,
    ) -> Result<String, RenderError> {
        let view = ReconnectionView {
            name,
            provider_name: provider.display_name(),
            reconnect_url: self.reconnect_url(provider),
            error,
        };
        self.hb.render(RECONNECTION_TEMPLATE, &view)
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("frontend_url", &self.frontend_url)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::services::report::tests::full_day;
    use chrono::Utc;
    use uuid::Uuid;

    pub(crate) fn profile() -> Profile {
        Profile {
            id: Uuid::new_v4(),
            email: "ada@example.com".into(),
            password_hash: String::new(),
            name: "Ada <Lovelace>".into(),
            timezone: "UTC".into(),
            city: Some("London".into()),
            is_admin: false,
            email_reports_enabled: true,
            last_active_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn renderer() -> Renderer {
        Renderer::new("http://localhost:3000/").unwrap()
    }

    #[test]
    fn test_report_lists_sections_and_escapes_names() {
        let html = renderer().render_report(&profile(), &full_day()).unwrap();
        assert!(html.contains("Ada &lt;Lovelace&gt;"));
        assert!(html.contains("12000 steps in total"));
        assert!(html.contains("Most played: Bonobo"));
        assert!(html.contains("Unavailable: not requested"));
        assert!(!html.contains("Connect an integration"));
    }

    #[test]
    fn test_empty_report_prompts_to_connect() {
        let data = ReportData::empty(ReportKind::Weekly, crate::services::report::tests::day());
        let html = renderer().render_report(&profile(), &data).unwrap();
        assert!(html.contains("Connect an integration"));
    }

    #[test]
    fn test_reconnection_email_links_to_provider() {
        let html = renderer()
            .render_reconnection("Ada", Provider::GoogleCalendar, Some("invalid_grant"))
            .unwrap();
        assert!(html.contains("http://localhost:3000/settings/integrations?reconnect=google_calendar"));
        assert!(html.contains("Google Calendar"));
        assert!(html.contains("Last error: invalid_grant"));
    }

    #[test]
    fn test_subject_for_weekly_range() {
        let period = ReportKind::Weekly.period(chrono::NaiveDate::from_ymd_opt(2026, 10, 17).unwrap());
        let mut data = ReportData::empty(ReportKind::Weekly, period);
        data.score = 64;
        assert_eq!(
            report_subject(ReportKind::Weekly, &data),
            "Your weekly Wellboard report: 64 (Oct 11 - Oct 17, 2026)"
        );
    }
}
