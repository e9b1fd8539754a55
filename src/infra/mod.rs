pub mod piwik;
