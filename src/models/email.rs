use serde::{Deserialize, Serialize};

/// Mail relay request body (SendGrid v3 `mail/send` shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailRequest {
    pub personalizations: Vec<MailPersonalization>,
    pub from: MailAddress,
    pub subject: String,
    pub content: Vec<MailContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailPersonalization {
    pub to: Vec<MailAddress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailAddress {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub value: String,
}

impl MailRequest {
    pub fn plain_text(from: &str, to: &str, subject: &str, body: &str) -> Self {
        Self {
            personalizations: vec![MailPersonalization {
                to: vec![MailAddress {
                    email: to.to_string(),
                }],
            }],
            from: MailAddress {
                email: from.to_string(),
            },
            subject: subject.to_string(),
            content: vec![MailContent {
                content_type: "text/plain".to_string(),
                value: body.to_string(),
            }],
        }
    }
}
