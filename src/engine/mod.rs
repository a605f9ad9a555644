pub mod think;
