pub mod posterior;
