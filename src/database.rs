pub mod dictionary_database;
pub mod dictionary_rows;
