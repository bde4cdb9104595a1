pub mod collapsed;
