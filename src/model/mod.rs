// The dynamical system abstraction and shipped systems
pub mod ode;
// Prior distributions for estimated parameters
pub mod prior;
// Model specification: parameters, initial conditions, observation, noise
pub mod spec;
// Shipped population-dynamics systems
pub mod systems;
