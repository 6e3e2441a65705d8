//! Static informational pages and the donation form

use serde::{Deserialize, Serialize};

pub const DONATION_THANKS: &str = "Thank you for your donation! We will contact you shortly.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    Home,
    About,
    Contact,
}

#[derive(Debug, Clone, Serialize)]
pub struct Feature {
    pub title: &'static str,
    pub summary: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactInfo {
    pub phone: &'static str,
    pub email: &'static str,
    pub address: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageContent {
    pub title: &'static str,
    pub paragraphs: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<Feature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<ContactInfo>,
}

impl Page {
    pub fn content(self) -> PageContent {
        match self {
            Page::Home => PageContent {
                title: "Welcome to the Blood Bank System",
                paragraphs: vec![
                    "This is a secure and efficient platform designed to manage and track blood donations and inventory in real-time. Our goal is to connect hospitals with the blood they need, when they need it, ensuring a quick and reliable supply.",
                    "Navigate to the dashboard to view current inventory, or use the request and search features to find specific blood types.",
                ],
                features: vec![
                    Feature {
                        title: "Real-time Dashboard",
                        summary: "View live inventory levels from all connected hospitals.",
                    },
                    Feature {
                        title: "Request & Track",
                        summary: "Easily request blood and track the status of your order.",
                    },
                    Feature {
                        title: "Efficient Search",
                        summary: "Quickly find specific blood types available across our network.",
                    },
                ],
                contact: None,
            },
            Page::About => PageContent {
                title: "About Us",
                paragraphs: vec![
                    "Our mission is to streamline the process of blood bank management through modern technology. We believe that every unit of blood is precious, and by providing a transparent and efficient system, we can help save lives.",
                    "This platform was created to demonstrate how a centralized, real-time database can improve communication between blood banks and hospitals. All data is updated as soon as it changes, giving healthcare professionals the most accurate information available.",
                    "We are dedicated to building a more resilient and responsive healthcare infrastructure, one feature at a time.",
                ],
                features: Vec::new(),
                contact: None,
            },
            Page::Contact => PageContent {
                title: "Contact Us",
                paragraphs: Vec::new(),
                features: Vec::new(),
                contact: Some(ContactInfo {
                    phone: "+91 98765 43210",
                    email: "contact.ind@bloodbank.dev",
                    address: "1A, J.B.S Haldane Ave, Salt Lake, Kolkata, West Bengal 700064, India",
                }),
            },
        }
    }
}

/// Donor sign-up submitted from the donate modal
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DonationForm {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub age: Option<u32>,
    /// "yes" or "no"
    #[serde(default)]
    pub medical_issues: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DonationError {
    #[error("Please fill in all fields.")]
    MissingFields,

    #[error("Medical issues must be \"yes\" or \"no\".")]
    InvalidMedicalIssues,
}

impl DonationForm {
    pub fn validate(&self) -> Result<(), DonationError> {
        let name_present = self
            .full_name
            .as_deref()
            .is_some_and(|n| !n.trim().is_empty());
        let weight_present = self.weight_kg.is_some_and(|w| w > 0.0);
        let age_present = self.age.is_some_and(|a| a > 0);

        if !(name_present && weight_present && age_present) {
            return Err(DonationError::MissingFields);
        }

        match self.medical_issues.as_deref() {
            None => Err(DonationError::MissingFields),
            Some("yes") | Some("no") => Ok(()),
            Some(_) => Err(DonationError::InvalidMedicalIssues),
        }
    }
}
