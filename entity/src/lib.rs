pub mod card;
pub mod contribution;
pub mod event;
pub mod member;
